pub mod artifact;
pub mod config;
pub mod discover;
pub mod model;
pub mod naming;
pub mod proxy;
pub mod store;

// Probe output decoding and merge rules
pub mod docker;
pub mod pm2;
pub mod status;

// Terminal sessions
pub mod session;
