//! Environment discovery and state carry-over.
//!
//! Discovery rebuilds every identity field from the filesystem on each pass.
//! Observed fields are never computed here; they are copied forward from the
//! previous list so that a discovery pass between two probe cycles does not
//! blank out live state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::artifact::{self, EnvFile, Manifest};
use crate::config::DashConfig;
use crate::model::{EnvKind, Environment, Observed, sort_environments};
use crate::naming;
use crate::proxy::RouteIndex;

/// Scan `dir` for worktree environments and merge in observed state from
/// `previous`. The result is in dashboard order.
pub fn discover(dir: &Path, previous: &[Environment], config: &DashConfig) -> Vec<Environment> {
    let routes = config
        .proxy_dir
        .as_deref()
        .map(RouteIndex::scan)
        .unwrap_or_default();

    let mut envs: Vec<Environment> = list_candidates(dir)
        .into_iter()
        .filter_map(|path| read_environment(&path, config, &routes))
        .collect();

    carry_over(&mut envs, previous);
    sort_environments(&mut envs);
    debug!(count = envs.len(), dir = %dir.display(), "discovered environments");
    envs
}

/// Copy observed fields from `previous` into records with the same path
pub fn carry_over(envs: &mut [Environment], previous: &[Environment]) {
    let observed: BTreeMap<&Path, &Observed> = previous
        .iter()
        .map(|e| (e.path.as_path(), &e.observed))
        .collect();

    for env in envs.iter_mut() {
        if let Some(prev) = observed.get(env.path.as_path()) {
            env.observed = (*prev).clone();
        }
    }
}

fn list_candidates(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Build the identity half of an environment record, or `None` when the
/// directory is not a worktree.
pub fn read_environment(path: &Path, config: &DashConfig, routes: &RouteIndex) -> Option<Environment> {
    let manifest_path = path.join(&config.manifest_file);
    let env_path = path.join(&config.env_file);
    let has_manifest = manifest_path.is_file();
    let has_env = env_path.is_file();
    let has_git = path.join(".git").exists();

    if !has_manifest && !has_env && !has_git {
        return None;
    }

    let name = path.file_name()?.to_string_lossy().into_owned();
    let env = EnvFile::read(&env_path);

    let alias = env
        .value(&config.vars.alias)
        .map(str::to_string)
        .unwrap_or_else(|| name.clone());
    let branch = env
        .value(&config.vars.branch)
        .map(str::to_string)
        .or_else(|| artifact::read_git_branch(path))
        .unwrap_or_default();

    let mut record = Environment {
        path: path.to_path_buf(),
        name,
        alias,
        branch,
        ..Default::default()
    };

    if !has_manifest && !has_env {
        record.kind = EnvKind::LocalOnly;
        return Some(record);
    }

    let manifest = if has_manifest {
        Manifest::read(&manifest_path, &config.vars.mode)
    } else {
        None
    };

    let offset = artifact::resolve_offset(&env, manifest.as_ref(), config);
    let app_port = config.primary_port().and_then(|p| p.checked_add(offset));

    record.kind = EnvKind::Container;
    record.container = naming::container_name(
        config,
        manifest.as_ref().and_then(|m| m.container_name.as_deref()),
        &record.alias,
        &record.name,
    );
    record.mode = manifest
        .as_ref()
        .and_then(|m| m.mode.clone())
        .or_else(|| env.value(&config.vars.mode).map(str::to_string))
        .unwrap_or_default();
    record.host_build = artifact::is_truthy(env.get(&config.vars.host_build));
    record.lan_domain = env.value(&config.vars.lan_domain).map(str::to_string);
    record.domain = artifact::resolve_domain(
        &env,
        routes,
        config,
        app_port,
        &record.alias,
        &record.name,
        &record.branch,
    );
    record.db_name = env
        .value(&config.vars.db_name)
        .map(str::to_string)
        .unwrap_or_else(|| naming::db_name(config, &record.alias, &record.name));
    record.offset = offset;
    record.ports = config
        .ports
        .iter()
        .filter_map(|(service, base)| base.checked_add(offset).map(|p| (service.clone(), p)))
        .collect();

    Some(record)
}
