use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use wtdash_core::config::DashConfig;
use wtdash_core::model::{Environment, Service};
use wtdash_core::naming;
use wtdash_core::pm2;

use super::{DOCKER, PM2};
use crate::exec::{CommandRunner, args};

fn suffix(config: &DashConfig, env: &Environment) -> String {
    naming::service_suffix(config, &env.alias, &env.name)
}

/// Services running inside an environment's container
pub async fn container_services(
    runner: &dyn CommandRunner,
    config: &DashConfig,
    env: &Environment,
) -> Vec<Service> {
    let container = env.stats_key().to_string();
    let output = match runner
        .run(DOCKER, &args(&["exec", &container, PM2, "jlist"]))
        .await
    {
        Ok(output) => output,
        Err(e) => {
            debug!(container = %container, error = %e, "in-container service listing failed");
            return Vec::new();
        }
    };

    match pm2::parse_jlist(&output) {
        Ok(records) => pm2::container_services(&records, &suffix(config, env)),
        Err(e) => {
            debug!(container = %container, error = %e, "service listing unparsable");
            Vec::new()
        }
    }
}

/// Host processes for every environment from a single listing
pub async fn host_services(
    runner: &dyn CommandRunner,
    config: &DashConfig,
    envs: &[Environment],
) -> BTreeMap<PathBuf, Vec<Service>> {
    let records = match runner.run(PM2, &args(&["jlist"])).await {
        Ok(output) => pm2::parse_jlist(&output).unwrap_or_else(|e| {
            debug!(error = %e, "host service listing unparsable");
            Vec::new()
        }),
        Err(e) => {
            debug!(error = %e, "host service listing failed");
            Vec::new()
        }
    };

    pm2::host_services_by_env(&records, envs, |env| suffix(config, env))
}

/// Service list for one environment, in-container unless `host` is set
pub async fn env_services(
    runner: &dyn CommandRunner,
    config: &DashConfig,
    env: &Environment,
    host: bool,
) -> Vec<Service> {
    if host || !env.is_container() {
        return host_services(runner, config, std::slice::from_ref(env))
            .await
            .remove(&env.path)
            .unwrap_or_default();
    }
    container_services(runner, config, env).await
}
