//! Container matching and probe merge rules.
//!
//! The probes in the CLI crate gather raw records; the functions here decide
//! which container belongs to which environment and how each probe result is
//! written into the observed fields.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::{ComposeStrategy, DashConfig};
use crate::docker::{ContainerRecord, RuntimeFacts, StatsRecord};
use crate::model::{EnvKind, Environment, sort_environments};
use crate::naming;

/// Lookup indexes over one container listing
#[derive(Clone, Debug, Default)]
pub struct ContainerIndex {
    by_name: BTreeMap<String, ContainerRecord>,
    by_workdir: BTreeMap<PathBuf, Vec<String>>,
}

impl ContainerIndex {
    pub fn new(records: Vec<ContainerRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            if record.name.is_empty() {
                continue;
            }
            if let Some(dir) = record.working_dir() {
                index
                    .by_workdir
                    .entry(dir)
                    .or_default()
                    .push(record.name.clone());
            }
            index.by_name.insert(record.name.clone(), record);
        }
        for names in index.by_workdir.values_mut() {
            names.sort();
        }
        index
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ContainerRecord> {
        self.by_name.get(name)
    }

    /// Container for an environment: working-directory label, exact name,
    /// template name, then (shared compose only) group prefix. Ties go to a
    /// running container, then to the lexicographically first name.
    pub fn resolve(&self, env: &Environment, config: &DashConfig) -> Option<&ContainerRecord> {
        if let Some(names) = self.by_workdir.get(&env.path) {
            if let Some(found) = self.pick(names.iter().map(String::as_str)) {
                return Some(found);
            }
        }

        if let Some(found) = self.by_name.get(&env.container) {
            return Some(found);
        }

        let templated = naming::template_container_name(config, &env.alias, &env.name);
        if let Some(found) = self.by_name.get(&templated) {
            return Some(found);
        }

        if config.compose_strategy != ComposeStrategy::Shared {
            return None;
        }

        // Only `{prefix}-{service}` for a configured service, so a sibling
        // environment like `feat-2` never lands in `feat`'s group
        let prefix = naming::container_group_prefix(config, &env.alias);
        let group = self
            .by_name
            .range(prefix.clone()..)
            .map(|(name, _)| name.as_str())
            .take_while(|name| name.starts_with(&prefix))
            .filter(|name| {
                name[prefix.len()..]
                    .strip_prefix('-')
                    .is_some_and(|service| config.ports.contains_key(service))
            });
        self.pick(group)
    }

    fn pick<'a>(&self, names: impl Iterator<Item = &'a str>) -> Option<&ContainerRecord> {
        let candidates: Vec<&ContainerRecord> =
            names.filter_map(|n| self.by_name.get(n)).collect();
        candidates
            .iter()
            .find(|r| r.is_running())
            .or_else(|| candidates.first())
            .copied()
    }
}

/// Outcome of one status probe for one container-backed environment
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusUpdate {
    pub running: bool,
    pub container_exists: bool,
    pub matched: Option<String>,
    /// `None` when the container is not running or inspect failed
    pub runtime: Option<RuntimeFacts>,
}

impl StatusUpdate {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn from_record(record: &ContainerRecord) -> Self {
        Self {
            running: record.is_running(),
            container_exists: true,
            matched: Some(record.name.clone()),
            runtime: None,
        }
    }
}

/// Write status results into the list and re-sort it.
///
/// `host_running` marks local-only environments that have an online host
/// process; pass `None` when host services are not probed.
pub fn apply_status(
    envs: &mut Vec<Environment>,
    updates: &BTreeMap<PathBuf, StatusUpdate>,
    host_running: Option<&BTreeMap<PathBuf, bool>>,
    now: DateTime<Utc>,
) {
    for env in envs.iter_mut() {
        match env.kind {
            EnvKind::Container => {
                let Some(update) = updates.get(&env.path) else {
                    continue;
                };
                apply_update(env, update, now);
            }
            EnvKind::LocalOnly => {
                if let Some(host) = host_running {
                    env.observed.running = host.get(&env.path).copied().unwrap_or(false);
                }
            }
        }
    }
    sort_environments(envs);
}

fn apply_update(env: &mut Environment, update: &StatusUpdate, now: DateTime<Utc>) {
    let observed = &mut env.observed;

    if !update.container_exists {
        *observed = Default::default();
        return;
    }

    observed.container_exists = true;
    observed.running = update.running;
    observed.matched_container = update.matched.clone();

    if !update.running {
        observed.clear_runtime();
        return;
    }

    // Inspect failures leave the previous health and start time in place
    if let Some(runtime) = &update.runtime {
        observed.health = runtime.health;
        observed.started = runtime.started;
    }
    observed.uptime = observed
        .started
        .map(|started| uptime_bucket(now.signed_duration_since(started)));
}

/// `Nm` under an hour, `NhMm` under a day, `NdHh` beyond
pub fn uptime_bucket(elapsed: chrono::TimeDelta) -> String {
    let minutes = elapsed.num_minutes().max(0);
    if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < 24 * 60 {
        format!("{}h{}m", minutes / 60, minutes % 60)
    } else {
        let hours = minutes / 60;
        format!("{}d{}h", hours / 24, hours % 24)
    }
}

/// Overlay a stats snapshot. Running environments take the matching record;
/// everything else is cleared.
pub fn apply_stats(envs: &mut [Environment], stats: &BTreeMap<String, StatsRecord>) {
    for env in envs.iter_mut() {
        if !env.is_container() || !env.is_running() {
            env.observed.clear_stats();
            continue;
        }
        let Some(record) = stats.get(env.stats_key()) else {
            continue;
        };
        env.observed.cpu = Some(record.cpu.clone());
        env.observed.mem = Some(record.mem_used().to_string());
        env.observed.mem_pct = Some(record.mem_pct.clone());
    }
}

/// Whether `path` lies under `root`
pub fn is_under(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}
