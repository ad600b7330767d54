use tracing::info;

use wtdash_core::model::{ALL_SERVICES, Environment, Service};

use super::{DOCKER, PM2};
use crate::exec::{CommandRunner, ExecError, args};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
        }
    }
}

/// Process-manager names a target refers to. The aggregate expands to every
/// real service; anything else matches by raw or display name.
fn target_names(services: &[Service], target: &str) -> Vec<String> {
    if target == ALL_SERVICES {
        return services
            .iter()
            .filter(|s| !s.is_aggregate())
            .map(|s| s.name.clone())
            .collect();
    }
    services
        .iter()
        .filter(|s| !s.is_aggregate())
        .find(|s| s.name == target || s.display_name == target)
        .map(|s| vec![s.name.clone()])
        .unwrap_or_else(|| vec![target.to_string()])
}

/// Best-effort process-manager action. In-container the aggregate is a
/// single `all` call; on the host it is one call per service so processes of
/// other environments are left alone.
pub async fn service_action(
    runner: &dyn CommandRunner,
    env: &Environment,
    services: &[Service],
    target: &str,
    action: ServiceAction,
    host: bool,
) -> Result<(), ExecError> {
    if host || !env.is_container() {
        for name in target_names(services, target) {
            info!(env = %env.alias, service = %name, action = action.as_str(), "host service action");
            runner.run(PM2, &args(&[action.as_str(), &name])).await?;
        }
        return Ok(());
    }

    let container = env.stats_key();
    let names = if target == ALL_SERVICES {
        vec![ALL_SERVICES.to_string()]
    } else {
        target_names(services, target)
    };
    for name in names {
        info!(container, service = %name, action = action.as_str(), "service action");
        runner
            .run(DOCKER, &args(&["exec", container, PM2, action.as_str(), &name]))
            .await?;
    }
    Ok(())
}

/// Best-effort container start/stop/restart
pub async fn container_action(
    runner: &dyn CommandRunner,
    env: &Environment,
    action: ContainerAction,
) -> Result<(), ExecError> {
    let container = env.stats_key();
    info!(container, action = action.as_str(), "container action");
    runner
        .run(DOCKER, &args(&[action.as_str(), container]))
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::exec::CommandOutput;
    use crate::exec::fake::FakeRunner;
    use wtdash_core::model::{EnvKind, with_aggregate};

    fn env(kind: EnvKind) -> Environment {
        Environment {
            path: PathBuf::from("/trees/feat"),
            name: "feat".into(),
            alias: "feat".into(),
            kind,
            container: "shop-feat".into(),
            ..Default::default()
        }
    }

    fn services() -> Vec<Service> {
        with_aggregate(vec![
            Service {
                name: "api-feat".into(),
                display_name: "api".into(),
                ..Default::default()
            },
            Service {
                name: "web-feat".into(),
                display_name: "web".into(),
                ..Default::default()
            },
        ])
    }

    #[tokio::test]
    async fn test_container_all_is_one_call() {
        let runner = FakeRunner::new(|_, _| CommandOutput::ok(""));
        service_action(
            &runner,
            &env(EnvKind::Container),
            &services(),
            "all",
            ServiceAction::Restart,
            false,
        )
        .await
        .unwrap();
        assert_eq!(runner.calls(), vec!["docker exec shop-feat pm2 restart all"]);
    }

    #[tokio::test]
    async fn test_host_all_expands_per_service() {
        let runner = FakeRunner::new(|_, _| CommandOutput::ok(""));
        service_action(
            &runner,
            &env(EnvKind::LocalOnly),
            &services(),
            "all",
            ServiceAction::Stop,
            false,
        )
        .await
        .unwrap();
        assert_eq!(runner.calls(), vec!["pm2 stop api-feat", "pm2 stop web-feat"]);
    }

    #[tokio::test]
    async fn test_display_name_resolves_to_raw_name() {
        let runner = FakeRunner::new(|_, _| CommandOutput::ok(""));
        service_action(
            &runner,
            &env(EnvKind::Container),
            &services(),
            "web",
            ServiceAction::Start,
            false,
        )
        .await
        .unwrap();
        assert_eq!(runner.calls(), vec!["docker exec shop-feat pm2 start web-feat"]);
    }

    #[tokio::test]
    async fn test_container_action_reports_failure() {
        let runner = FakeRunner::new(|_, _| CommandOutput::failed(1, "No such container"));
        let result = container_action(&runner, &env(EnvKind::Container), ContainerAction::Stop).await;
        assert!(result.is_err());
        assert_eq!(runner.calls(), vec!["docker stop shop-feat"]);
    }
}
