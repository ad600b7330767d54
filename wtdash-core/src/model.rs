use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvKind {
    /// Has a generated manifest or env file, so containers are expected
    #[default]
    Container,
    /// Plain worktree without container artifacts
    LocalOnly,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Starting,
    #[default]
    Unknown,
}

impl Health {
    /// Map the container engine's health string
    pub fn from_engine(status: &str) -> Self {
        match status {
            "healthy" => Health::Healthy,
            "starting" => Health::Starting,
            _ => Health::Unknown,
        }
    }
}

/// Probe-owned fields. Only probe merges write these; discovery copies
/// them forward untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Observed {
    pub running: bool,
    pub container_exists: bool,
    pub health: Health,
    pub started: Option<DateTime<Utc>>,
    pub uptime: Option<String>,
    pub cpu: Option<String>,
    pub mem: Option<String>,
    pub mem_pct: Option<String>,
    /// Container name the status probe actually matched
    pub matched_container: Option<String>,
}

impl Observed {
    pub fn clear_stats(&mut self) {
        self.cpu = None;
        self.mem = None;
        self.mem_pct = None;
    }

    pub fn clear_runtime(&mut self) {
        self.health = Health::Unknown;
        self.started = None;
        self.uptime = None;
    }
}

/// One worktree environment as the dashboard shows it
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Environment {
    pub path: PathBuf,
    /// Directory name
    pub name: String,
    pub alias: String,
    pub kind: EnvKind,
    pub branch: String,

    pub container: String,
    /// Selected service subset
    pub mode: String,
    pub host_build: bool,
    pub domain: String,
    pub lan_domain: Option<String>,
    pub db_name: String,
    pub offset: u16,
    /// Service name to host port (base port plus offset)
    pub ports: BTreeMap<String, u16>,

    pub observed: Observed,
}

impl Environment {
    pub fn is_container(&self) -> bool {
        self.kind == EnvKind::Container
    }

    pub fn is_running(&self) -> bool {
        self.observed.running
    }

    /// Name used to key per-container results such as stats
    pub fn stats_key(&self) -> &str {
        self.observed
            .matched_container
            .as_deref()
            .unwrap_or(&self.container)
    }

    /// Rank for the dashboard order; lower sorts first
    pub fn sort_rank(&self) -> u8 {
        let observed = &self.observed;
        match (self.kind, observed.running, observed.container_exists) {
            (EnvKind::Container, true, _) => 0,
            (EnvKind::LocalOnly, true, _) => 1,
            (EnvKind::Container, false, true) => 2,
            (EnvKind::LocalOnly, false, _) => 3,
            (EnvKind::Container, false, false) => 4,
        }
    }
}

/// Stable sort into dashboard order
pub fn sort_environments(envs: &mut [Environment]) {
    envs.sort_by_key(Environment::sort_rank);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Online,
    Stopped,
    #[default]
    Unknown,
}

impl ServiceStatus {
    pub fn from_manager(status: &str) -> Self {
        match status {
            "online" => ServiceStatus::Online,
            "stopped" => ServiceStatus::Stopped,
            _ => ServiceStatus::Unknown,
        }
    }
}

/// Name of the synthetic aggregate entry
pub const ALL_SERVICES: &str = "all";

/// A process-manager entry inside a container or host process group
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Service {
    /// Raw process-manager name, used for actions
    pub name: String,
    pub display_name: String,
    pub status: ServiceStatus,
    pub memory_bytes: u64,
    pub cpu_percent: f32,
    pub restart_count: u32,
}

impl Service {
    pub fn is_aggregate(&self) -> bool {
        self.name == ALL_SERVICES
    }
}

/// Prepend the "all services" entry, or return nothing when there are
/// no real services.
pub fn with_aggregate(services: Vec<Service>) -> Vec<Service> {
    if services.is_empty() {
        return Vec::new();
    }

    let any_online = services.iter().any(|s| s.status == ServiceStatus::Online);
    let aggregate = Service {
        name: ALL_SERVICES.to_string(),
        display_name: "All services".to_string(),
        status: if any_online {
            ServiceStatus::Online
        } else {
            ServiceStatus::Stopped
        },
        memory_bytes: services.iter().map(|s| s.memory_bytes).sum(),
        cpu_percent: services.iter().map(|s| s.cpu_percent).sum(),
        restart_count: services.iter().map(|s| s.restart_count).sum(),
    };

    let mut out = Vec::with_capacity(services.len() + 1);
    out.push(aggregate);
    out.extend(services);
    out
}

/// Format bytes as a human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str, kind: EnvKind, running: bool, exists: bool) -> Environment {
        Environment {
            path: PathBuf::from(format!("/trees/{name}")),
            name: name.to_string(),
            alias: name.to_string(),
            kind,
            observed: Observed {
                running,
                container_exists: exists,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn names(envs: &[Environment]) -> Vec<&str> {
        envs.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_sort_running_then_local_then_stopped() {
        let inputs = [
            vec![
                env("stopped", EnvKind::Container, false, false),
                env("local", EnvKind::LocalOnly, false, false),
                env("running", EnvKind::Container, true, true),
            ],
            vec![
                env("local", EnvKind::LocalOnly, false, false),
                env("running", EnvKind::Container, true, true),
                env("stopped", EnvKind::Container, false, false),
            ],
            vec![
                env("running", EnvKind::Container, true, true),
                env("stopped", EnvKind::Container, false, false),
                env("local", EnvKind::LocalOnly, false, false),
            ],
        ];

        for mut envs in inputs {
            sort_environments(&mut envs);
            assert_eq!(names(&envs), vec!["running", "local", "stopped"]);
        }
    }

    #[test]
    fn test_sort_full_rank_order() {
        let mut envs = vec![
            env("absent", EnvKind::Container, false, false),
            env("local-idle", EnvKind::LocalOnly, false, false),
            env("exists", EnvKind::Container, false, true),
            env("local-up", EnvKind::LocalOnly, true, false),
            env("up", EnvKind::Container, true, true),
        ];
        sort_environments(&mut envs);
        assert_eq!(
            names(&envs),
            vec!["up", "local-up", "exists", "local-idle", "absent"]
        );
    }

    #[test]
    fn test_sort_is_stable_within_rank() {
        let mut envs = vec![
            env("b", EnvKind::Container, true, true),
            env("a", EnvKind::Container, true, true),
        ];
        sort_environments(&mut envs);
        assert_eq!(names(&envs), vec!["b", "a"]);
    }

    #[test]
    fn test_aggregate_absent_without_services() {
        assert!(with_aggregate(Vec::new()).is_empty());
    }

    #[test]
    fn test_aggregate_sums_and_leads() {
        let services = vec![
            Service {
                name: "api".into(),
                display_name: "api".into(),
                status: ServiceStatus::Stopped,
                memory_bytes: 100,
                cpu_percent: 1.5,
                restart_count: 2,
            },
            Service {
                name: "web".into(),
                display_name: "web".into(),
                status: ServiceStatus::Online,
                memory_bytes: 50,
                cpu_percent: 0.5,
                restart_count: 1,
            },
        ];
        let out = with_aggregate(services);
        assert_eq!(out.len(), 3);
        assert!(out[0].is_aggregate());
        assert_eq!(out[0].status, ServiceStatus::Online);
        assert_eq!(out[0].memory_bytes, 150);
        assert_eq!(out[0].restart_count, 3);
        assert_eq!(out[1].name, "api");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.0K");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0M");
    }
}
