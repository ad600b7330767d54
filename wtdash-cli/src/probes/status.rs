use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use wtdash_core::config::DashConfig;
use wtdash_core::docker;
use wtdash_core::model::{Environment, ServiceStatus};
use wtdash_core::pm2;
use wtdash_core::status::{ContainerIndex, StatusUpdate};

use super::{DOCKER, PM2};
use crate::exec::{CommandRunner, args};

/// Result of one status cycle, ready to merge with `apply_status`
#[derive(Clone, Debug, Default)]
pub struct StatusReport {
    pub updates: BTreeMap<PathBuf, StatusUpdate>,
    /// Local-only environments with an online host process; `None` when host
    /// services are disabled or the listing failed
    pub host_running: Option<BTreeMap<PathBuf, bool>>,
}

/// List containers, match them to environments, inspect the running ones.
/// `None` when the listing itself fails.
pub async fn probe_status(
    runner: &dyn CommandRunner,
    config: &DashConfig,
    envs: &[Environment],
) -> Option<StatusReport> {
    let filter = format!("name={}", config.container_filter());
    let listing = runner
        .run(
            DOCKER,
            &args(&["ps", "-a", "--filter", &filter, "--format", "{{json .}}"]),
        )
        .await;

    let output = match listing {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "container listing failed, keeping previous status");
            return None;
        }
    };

    let index = ContainerIndex::new(docker::parse_ps(&output));
    debug!(containers = index.len(), "container listing");

    let mut updates = BTreeMap::new();
    for env in envs.iter().filter(|e| e.is_container()) {
        let update = match index.resolve(env, config) {
            None => StatusUpdate::absent(),
            Some(record) => {
                let mut update = StatusUpdate::from_record(record);
                if record.is_running() {
                    update.runtime = inspect(runner, &record.name).await;
                }
                update
            }
        };
        updates.insert(env.path.clone(), update);
    }

    let host_running = if config.features.host_services && envs.iter().any(|e| !e.is_container())
    {
        host_running(runner, envs).await
    } else {
        None
    };

    Some(StatusReport {
        updates,
        host_running,
    })
}

async fn inspect(runner: &dyn CommandRunner, name: &str) -> Option<docker::RuntimeFacts> {
    let output = match runner.run(DOCKER, &args(&["inspect", name])).await {
        Ok(output) => output,
        Err(e) => {
            debug!(container = name, error = %e, "inspect failed");
            return None;
        }
    };
    match docker::parse_inspect(&output) {
        Ok(facts) => Some(facts),
        Err(e) => {
            debug!(container = name, error = %e, "inspect output unparsable");
            None
        }
    }
}

async fn host_running(
    runner: &dyn CommandRunner,
    envs: &[Environment],
) -> Option<BTreeMap<PathBuf, bool>> {
    let output = runner.run(PM2, &args(&["jlist"])).await.ok()?;
    let records = pm2::parse_jlist(&output).ok()?;

    let local: Vec<Environment> = envs.iter().filter(|e| !e.is_container()).cloned().collect();
    let by_env = pm2::host_services_by_env(&records, &local, |_| String::new());
    Some(
        by_env
            .into_iter()
            .map(|(path, services)| {
                let online = services
                    .iter()
                    .any(|s| !s.is_aggregate() && s.status == ServiceStatus::Online);
                (path, online)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::exec::fake::FakeRunner;
    use wtdash_core::model::{EnvKind, Health};

    fn config() -> DashConfig {
        DashConfig {
            project: "shop".into(),
            ..Default::default()
        }
    }

    fn env(name: &str, kind: EnvKind) -> Environment {
        Environment {
            path: PathBuf::from(format!("/trees/{name}")),
            name: name.into(),
            alias: name.into(),
            kind,
            container: format!("shop-{name}"),
            ..Default::default()
        }
    }

    const PS: &str = r#"{"Names":"shop-feat","State":"running","Status":"Up","Labels":""}
{"Names":"legacy-box","State":"exited","Status":"Exited (1)","Labels":"com.docker.compose.project.working_dir=/trees/old"}
"#;

    #[tokio::test]
    async fn test_status_report() {
        let runner = FakeRunner::new(|_, args| match args[0].as_str() {
            "ps" => CommandOutput::ok(PS),
            "inspect" => CommandOutput::ok(
                r#"[{"State":{"StartedAt":"2024-01-01T00:00:00Z","Health":{"Status":"healthy"}}}]"#,
            ),
            _ => CommandOutput::failed(1, "unexpected"),
        });
        let envs = vec![
            env("feat", EnvKind::Container),
            env("old", EnvKind::Container),
            env("gone", EnvKind::Container),
            env("local", EnvKind::LocalOnly),
        ];

        let report = probe_status(&runner, &config(), &envs).await.unwrap();

        let feat = &report.updates[&PathBuf::from("/trees/feat")];
        assert!(feat.running);
        assert_eq!(feat.runtime.as_ref().unwrap().health, Health::Healthy);

        let old = &report.updates[&PathBuf::from("/trees/old")];
        assert!(old.container_exists);
        assert!(!old.running);
        assert_eq!(old.matched.as_deref(), Some("legacy-box"));

        assert!(!report.updates[&PathBuf::from("/trees/gone")].container_exists);
        assert!(!report.updates.contains_key(&PathBuf::from("/trees/local")));
        assert!(report.host_running.is_none());

        // Only the running container is inspected
        assert_eq!(runner.calls_matching("inspect"), vec!["docker inspect shop-feat"]);
        assert_eq!(
            runner.calls_matching("ps"),
            vec!["docker ps -a --filter name=shop- --format {{json .}}"]
        );
    }

    #[tokio::test]
    async fn test_listing_failure_yields_none() {
        let runner = FakeRunner::new(|_, _| CommandOutput::failed(1, "daemon down"));
        let envs = vec![env("feat", EnvKind::Container)];
        assert!(probe_status(&runner, &config(), &envs).await.is_none());
    }

    #[tokio::test]
    async fn test_inspect_failure_keeps_first_pass() {
        let runner = FakeRunner::new(|_, args| match args[0].as_str() {
            "ps" => CommandOutput::ok(PS),
            _ => CommandOutput::failed(1, "no such object"),
        });
        let envs = vec![env("feat", EnvKind::Container)];
        let report = probe_status(&runner, &config(), &envs).await.unwrap();
        let feat = &report.updates[&PathBuf::from("/trees/feat")];
        assert!(feat.running);
        assert!(feat.runtime.is_none());
    }

    #[tokio::test]
    async fn test_host_services_mark_local_running() {
        let runner = FakeRunner::new(|program, _| match program {
            "docker" => CommandOutput::ok(""),
            _ => CommandOutput::ok(
                r#"[{"name":"web","pm2_env":{"status":"online","pm_cwd":"/trees/local"}}]"#,
            ),
        });
        let mut config = config();
        config.features.host_services = true;
        let envs = vec![env("local", EnvKind::LocalOnly), env("idle", EnvKind::LocalOnly)];

        let report = probe_status(&runner, &config, &envs).await.unwrap();
        let host = report.host_running.unwrap();
        assert_eq!(host.get(&PathBuf::from("/trees/local")), Some(&true));
        assert_eq!(host.get(&PathBuf::from("/trees/idle")), Some(&false));
        assert_eq!(runner.calls_matching("pm2").len(), 1);
    }
}
