//! Background refresh of the environment snapshot.
//!
//! One task per probing concern. Each loop runs its probe to completion
//! before waiting for the next tick, so two probes of the same kind never
//! overlap, and merges its result into the store as a whole-list swap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use wtdash_core::config::DashConfig;
use wtdash_core::discover::discover;
use wtdash_core::status::{apply_stats, apply_status};
use wtdash_core::store::EnvStore;

use crate::exec::CommandRunner;
use crate::probes::{probe_stats, probe_status};

/// Rescan the worktrees directory and publish the result
pub async fn discovery_pass(config: &Arc<DashConfig>, store: &EnvStore) {
    let previous = store.current().environments;
    let config = config.clone();
    let scanned = tokio::task::spawn_blocking(move || {
        discover(&config.worktrees_dir, &previous, &config)
    })
    .await;

    match scanned {
        Ok(envs) => {
            let version = store.publish_discovery(envs);
            debug!(version, "discovery published");
        }
        Err(e) => warn!(error = %e, "discovery task failed"),
    }
}

/// Probe container status and merge it. Returns whether anything was merged.
pub async fn status_pass(runner: &dyn CommandRunner, config: &DashConfig, store: &EnvStore) -> bool {
    let envs = store.current().environments;
    let Some(report) = probe_status(runner, config, &envs).await else {
        return false;
    };
    store.update(|envs| {
        apply_status(
            envs,
            &report.updates,
            report.host_running.as_ref(),
            Utc::now(),
        )
    });
    true
}

/// Sample container resources and merge them
pub async fn stats_pass(runner: &dyn CommandRunner, store: &EnvStore) -> bool {
    let Some(stats) = probe_stats(runner).await else {
        return false;
    };
    store.update(|envs| apply_stats(envs, &stats));
    true
}

/// A single discovery, status and stats pass, in that order
pub async fn refresh_once(runner: &dyn CommandRunner, config: &Arc<DashConfig>, store: &EnvStore) {
    discovery_pass(config, store).await;
    status_pass(runner, config, store).await;
    if config.features.stats {
        stats_pass(runner, store).await;
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Handle to the running refresh loops; dropping it stops them
pub struct Refresher {
    refresh: Arc<Notify>,
    handles: Vec<JoinHandle<()>>,
}

impl Refresher {
    pub fn spawn(runner: Arc<dyn CommandRunner>, config: Arc<DashConfig>, store: EnvStore) -> Self {
        let refresh = Arc::new(Notify::new());
        let mut handles = Vec::new();

        handles.push(tokio::spawn({
            let config = config.clone();
            let store = store.clone();
            let refresh = refresh.clone();
            async move {
                let mut ticker = ticker(config.intervals.discovery());
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = refresh.notified() => debug!("discovery requested"),
                    }
                    discovery_pass(&config, &store).await;
                }
            }
        }));

        handles.push(tokio::spawn({
            let runner = runner.clone();
            let config = config.clone();
            let store = store.clone();
            async move {
                let mut ticker = ticker(config.intervals.status());
                loop {
                    ticker.tick().await;
                    status_pass(runner.as_ref(), &config, &store).await;
                }
            }
        }));

        if config.features.stats {
            handles.push(tokio::spawn(async move {
                let mut ticker = ticker(config.intervals.stats());
                loop {
                    ticker.tick().await;
                    stats_pass(runner.as_ref(), &store).await;
                }
            }));
        }

        Self { refresh, handles }
    }

    /// Run a discovery pass now instead of waiting for the next tick
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
