//! Best-effort queries against the container engine and process manager.
//!
//! Probes never fail outward: status and stats return `None` when the engine
//! can't be queried so the caller keeps its previous snapshot, and service
//! probes return an empty list.

mod actions;
mod services;
mod stats;
mod status;

pub use actions::{ContainerAction, ServiceAction, container_action, service_action};
pub use services::env_services;
pub use stats::probe_stats;
pub use status::probe_status;

/// Container engine CLI
pub const DOCKER: &str = "docker";

/// Process manager CLI
pub const PM2: &str = "pm2";
