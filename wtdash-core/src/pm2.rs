//! Decoding for the process manager's `jlist` output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::model::{Environment, Service, ServiceStatus, with_aggregate};
use crate::status::is_under;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProcessRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pm2_env: Option<ProcessEnv>,
    #[serde(default)]
    pub monit: Option<ProcessMonit>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProcessEnv {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub restart_time: Option<u32>,
    /// Working directory the process was started from
    #[serde(default)]
    pub pm_cwd: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProcessMonit {
    #[serde(default)]
    pub memory: Option<u64>,
    #[serde(default)]
    pub cpu: Option<f32>,
}

impl ProcessRecord {
    pub fn cwd(&self) -> Option<PathBuf> {
        self.pm2_env
            .as_ref()
            .and_then(|e| e.pm_cwd.as_deref())
            .filter(|c| !c.is_empty())
            .map(PathBuf::from)
    }

    /// Convert to a service, stripping `suffix` from the display name
    pub fn to_service(&self, suffix: &str) -> Service {
        let env = self.pm2_env.clone().unwrap_or_default();
        let monit = self.monit.clone().unwrap_or_default();
        let display_name = if !suffix.is_empty() {
            self.name.strip_suffix(suffix).unwrap_or(&self.name)
        } else {
            &self.name
        };

        Service {
            name: self.name.clone(),
            display_name: display_name.to_string(),
            status: env
                .status
                .as_deref()
                .map(ServiceStatus::from_manager)
                .unwrap_or_default(),
            memory_bytes: monit.memory.unwrap_or(0),
            cpu_percent: monit.cpu.unwrap_or(0.0),
            restart_count: env.restart_time.unwrap_or(0),
        }
    }
}

/// Parse `jlist` output. The manager sometimes prints banner lines before the
/// JSON array (`[PM2] ...`), so decoding starts at the first `[` that opens
/// an array of objects.
pub fn parse_jlist(output: &str) -> Result<Vec<ProcessRecord>, serde_json::Error> {
    let start = output
        .match_indices('[')
        .map(|(i, _)| i)
        .find(|&i| {
            matches!(
                output[i + 1..].trim_start().chars().next(),
                Some('{') | Some(']') | None
            )
        })
        .unwrap_or(0);
    serde_json::from_str(output[start..].trim())
}

/// Services of one container, aggregate first
pub fn container_services(records: &[ProcessRecord], suffix: &str) -> Vec<Service> {
    let services = records
        .iter()
        .filter(|r| !r.name.is_empty())
        .map(|r| r.to_service(suffix))
        .collect();
    with_aggregate(services)
}

/// Host processes whose working directory is under `root`
pub fn host_services(records: &[ProcessRecord], root: &Path, suffix: &str) -> Vec<Service> {
    let services = records
        .iter()
        .filter(|r| r.cwd().is_some_and(|cwd| is_under(&cwd, root)))
        .map(|r| r.to_service(suffix))
        .collect();
    with_aggregate(services)
}

/// Split one host listing across every environment. `suffix_for` yields the
/// name suffix to strip for an environment.
pub fn host_services_by_env(
    records: &[ProcessRecord],
    envs: &[Environment],
    suffix_for: impl Fn(&Environment) -> String,
) -> BTreeMap<PathBuf, Vec<Service>> {
    envs.iter()
        .map(|env| {
            let services = host_services(records, &env.path, &suffix_for(env));
            (env.path.clone(), services)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const JLIST: &str = r#"[PM2] Spawning PM2 daemon
[
  {"name":"api-feat","pm2_env":{"status":"online","restart_time":3,"pm_cwd":"/trees/feat/api"},"monit":{"memory":1048576,"cpu":2.5}},
  {"name":"worker-feat","pm2_env":{"status":"stopped","restart_time":0,"pm_cwd":"/trees/feat"},"monit":{"memory":0,"cpu":0}},
  {"name":"api-other","pm2_env":{"status":"errored","pm_cwd":"/trees/feature-two"}}
]"#;

    #[test]
    fn test_parse_jlist_skips_banner() {
        let records = parse_jlist(JLIST).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].cwd(), Some(PathBuf::from("/trees/feat/api")));
        assert!(parse_jlist("not json").is_err());
    }

    #[test]
    fn test_container_services_strip_suffix() {
        let records = parse_jlist(JLIST).unwrap();
        let services = container_services(&records, "-feat");
        assert_eq!(services.len(), 4);
        assert!(services[0].is_aggregate());
        assert_eq!(services[1].name, "api-feat");
        assert_eq!(services[1].display_name, "api");
        assert_eq!(services[1].status, ServiceStatus::Online);
        assert_eq!(services[1].restart_count, 3);
        assert_eq!(services[3].status, ServiceStatus::Unknown);
    }

    #[test]
    fn test_no_services_no_aggregate() {
        assert!(container_services(&[], "-feat").is_empty());
        let records = parse_jlist(JLIST).unwrap();
        assert!(host_services(&records, Path::new("/elsewhere"), "").is_empty());
    }

    #[test]
    fn test_host_services_filter_by_path_component() {
        let records = parse_jlist(JLIST).unwrap();
        let services = host_services(&records, Path::new("/trees/feat"), "-feat");
        // "/trees/feature-two" is not under "/trees/feat"
        let names: Vec<_> = services.iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(names, vec!["All services", "api", "worker"]);
    }
}
