use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How an environment's containers come to exist
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeStrategy {
    /// One container generated per worktree from a manifest template
    #[default]
    Generate,
    /// A pre-existing multi-container compose file shared by all worktrees
    Shared,
}

/// Names of the env-file variables the artifact reader looks for
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct VarNames {
    pub offset: String,
    pub port_base: String,
    pub lan_domain: String,
    pub mode: String,
    pub alias: String,
    pub branch: String,
    pub db_name: String,
    pub host_build: String,
}

impl Default for VarNames {
    fn default() -> Self {
        Self {
            offset: "PORT_OFFSET".into(),
            port_base: "PORT_BASE".into(),
            lan_domain: "LAN_DOMAIN".into(),
            mode: "DEV_MODE".into(),
            alias: "WORKTREE_ALIAS".into(),
            branch: "WORKTREE_BRANCH".into(),
            db_name: "DB_NAME".into(),
            host_build: "HOST_BUILD".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Features {
    /// Run the container stats probe
    pub stats: bool,
    /// Query the host process manager for local-only environments
    pub host_services: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            stats: true,
            host_services: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Intervals {
    pub discovery_ms: u64,
    pub status_ms: u64,
    pub stats_ms: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            discovery_ms: 2000,
            status_ms: 5000,
            stats_ms: 3000,
        }
    }
}

impl Intervals {
    pub fn discovery(&self) -> Duration {
        Duration::from_millis(self.discovery_ms)
    }

    pub fn status(&self) -> Duration {
        Duration::from_millis(self.status_ms)
    }

    pub fn stats(&self) -> Duration {
        Duration::from_millis(self.stats_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TmuxConfig {
    /// Dedicated server socket name (`tmux -L`)
    pub socket: String,
    /// Session that hosts every terminal window
    pub session: String,
    /// Columns reserved for the control region
    pub control_width: u16,
    /// Shell started in new sessions (falls back to $SHELL)
    pub shell: Option<String>,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            socket: "wtdash".into(),
            session: "wtdash".into(),
            control_width: 48,
            shell: None,
        }
    }
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DashConfig {
    /// Project name used in container naming templates
    pub project: String,

    /// Directory whose immediate children are worktrees
    pub worktrees_dir: PathBuf,

    /// Per-worktree env file name
    pub env_file: String,

    /// Per-worktree generated compose manifest name
    pub manifest_file: String,

    pub compose_strategy: ComposeStrategy,

    /// Service whose port is the application port
    pub primary_service: String,

    /// Base port per service, before the offset is applied
    pub ports: BTreeMap<String, u16>,

    pub container_template: String,

    /// `docker ps --filter name=` value; defaults to `{project}-`
    pub container_prefix: Option<String>,

    pub domain_template: Option<String>,

    pub db_name_template: String,

    /// Per-environment suffix on process-manager names
    pub service_suffix: String,

    /// Reverse-proxy dynamic config directory
    pub proxy_dir: Option<PathBuf>,

    pub vars: VarNames,
    pub features: Features,
    pub intervals: Intervals,
    pub tmux: TmuxConfig,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            project: "app".into(),
            worktrees_dir: PathBuf::from(".worktrees"),
            env_file: ".env.worktree".into(),
            manifest_file: "docker-compose.worktree.yml".into(),
            compose_strategy: ComposeStrategy::Generate,
            primary_service: "app".into(),
            ports: BTreeMap::from([("app".to_string(), 3000)]),
            container_template: "{project}-{slug}".into(),
            container_prefix: None,
            domain_template: None,
            db_name_template: "{project}_{slug}".into(),
            service_suffix: "-{alias}".into(),
            proxy_dir: None,
            vars: VarNames::default(),
            features: Features::default(),
            intervals: Intervals::default(),
            tmux: TmuxConfig::default(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("primary service '{service}' has no entry in ports")]
    UnknownPrimaryService { service: String },

    #[error("interval '{name}' must be greater than zero")]
    ZeroInterval { name: &'static str },

    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

impl DashConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;
        if config.worktrees_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.worktrees_dir = parent.join(&config.worktrees_dir);
            }
        }
        Ok(config)
    }

    /// Load configuration from a string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: DashConfig = if content.trim().is_empty() {
            DashConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Search for config file in standard locations
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let names = ["wtdash.yaml", "wtdash.yml", ".wtdash.yaml", ".wtdash.yml"];
        let mut searched = Vec::new();

        if let Ok(env_path) = std::env::var("WTDASH_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &names {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ports.is_empty() && !self.ports.contains_key(&self.primary_service) {
            return Err(ConfigError::UnknownPrimaryService {
                service: self.primary_service.clone(),
            });
        }

        for (name, value) in [
            ("discovery_ms", self.intervals.discovery_ms),
            ("status_ms", self.intervals.status_ms),
            ("stats_ms", self.intervals.stats_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { name });
            }
        }

        Ok(())
    }

    /// Base port of the primary service
    pub fn primary_port(&self) -> Option<u16> {
        self.ports.get(&self.primary_service).copied()
    }

    /// Lowest configured base port, used to turn a port base into an offset
    pub fn lowest_port(&self) -> Option<u16> {
        self.ports.values().copied().min()
    }

    /// Name filter for container listings
    pub fn container_filter(&self) -> String {
        self.container_prefix
            .clone()
            .unwrap_or_else(|| format!("{}-", self.project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DashConfig::from_str("").unwrap();
        assert_eq!(config.env_file, ".env.worktree");
        assert_eq!(config.primary_port(), Some(3000));
        assert_eq!(config.intervals.status(), Duration::from_secs(5));
        assert_eq!(config.intervals.stats(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
project: shop
compose_strategy: shared
primary_service: web
ports:
  web: 8080
  db: 5432
vars:
  offset: OFFSET
features:
  host_services: true
tmux:
  socket: shop-dash
"#;
        let config = DashConfig::from_str(yaml).unwrap();
        assert_eq!(config.project, "shop");
        assert_eq!(config.compose_strategy, ComposeStrategy::Shared);
        assert_eq!(config.primary_port(), Some(8080));
        assert_eq!(config.lowest_port(), Some(5432));
        assert_eq!(config.vars.offset, "OFFSET");
        assert_eq!(config.vars.port_base, "PORT_BASE");
        assert!(config.features.host_services);
        assert!(config.features.stats);
        assert_eq!(config.tmux.socket, "shop-dash");
        assert_eq!(config.container_filter(), "shop-");
    }

    #[test]
    fn test_unknown_primary_service() {
        let yaml = r#"
primary_service: api
ports:
  web: 8080
"#;
        let result = DashConfig::from_str(yaml);
        assert!(matches!(
            result,
            Err(ConfigError::UnknownPrimaryService { .. })
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let yaml = r#"
intervals:
  stats_ms: 0
"#;
        let result = DashConfig::from_str(yaml);
        assert!(matches!(
            result,
            Err(ConfigError::ZeroInterval { name: "stats_ms" })
        ));
    }

    #[test]
    fn test_load_resolves_worktrees_dir_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wtdash.yaml");
        std::fs::write(&path, "worktrees_dir: trees\n").unwrap();

        let config = DashConfig::load(&path).unwrap();
        assert_eq!(config.worktrees_dir, dir.path().join("trees"));
    }
}
