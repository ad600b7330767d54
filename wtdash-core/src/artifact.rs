//! Per-environment artifact reader.
//!
//! Everything here is best-effort: missing files read as empty, and a
//! pattern that does not match falls through to the next fallback.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::DashConfig;
use crate::naming;
use crate::proxy::RouteIndex;

static CONTAINER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*container_name:\s*["']?([^"'\s#]+)"#).expect("valid regex")
});

static PORT_MAPPING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?(?:[\d.]+:)?(\d+):(\d+)(?:/\w+)?["']?"#).expect("valid regex")
});

/// `KEY=value` lines, first occurrence of a key wins
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvFile {
    values: BTreeMap<String, String>,
}

impl EnvFile {
    /// Read an env file; a missing file is an empty set
    pub fn read(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut values = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            values
                .entry(key.to_string())
                .or_insert_with(|| unquote(value.trim()).to_string());
        }
        Self { values }
    }

    /// Value for `key`, empty string when absent
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    /// Non-empty value for `key`
    pub fn value(&self, key: &str) -> Option<&str> {
        Some(self.get(key)).filter(|v| !v.is_empty())
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Facts pattern-matched out of the generated compose manifest
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    pub container_name: Option<String>,
    pub mode: Option<String>,
    /// container port -> host port
    pub host_ports: BTreeMap<u16, u16>,
}

impl Manifest {
    pub fn read(path: &Path, mode_var: &str) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        Some(Self::parse(&content, mode_var))
    }

    pub fn parse(content: &str, mode_var: &str) -> Self {
        let container_name = CONTAINER_NAME
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        let mode = mode_pattern(mode_var)
            .and_then(|re| re.captures(content))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        let mut host_ports = BTreeMap::new();
        for caps in PORT_MAPPING.captures_iter(content) {
            let host = caps.get(1).and_then(|m| m.as_str().parse::<u16>().ok());
            let container = caps.get(2).and_then(|m| m.as_str().parse::<u16>().ok());
            if let (Some(host), Some(container)) = (host, container) {
                host_ports.entry(container).or_insert(host);
            }
        }

        Self {
            container_name,
            mode,
            host_ports,
        }
    }
}

/// Matches `MODE: value`, `MODE=value` and `- MODE=value`
fn mode_pattern(var: &str) -> Option<Regex> {
    if var.is_empty() {
        return None;
    }
    Regex::new(&format!(
        r#"(?m)^\s*(?:-\s*)?["']?{}["']?\s*[:=]\s*["']?([^"'\s#]+)"#,
        regex::escape(var)
    ))
    .ok()
}

/// Offset resolution: explicit variable, port base, manifest mapping, zero
pub fn resolve_offset(env: &EnvFile, manifest: Option<&Manifest>, config: &DashConfig) -> u16 {
    if let Some(offset) = env
        .value(&config.vars.offset)
        .and_then(|v| v.parse::<u16>().ok())
    {
        return offset;
    }

    if let Some(base) = env
        .value(&config.vars.port_base)
        .and_then(|v| v.parse::<u16>().ok())
    {
        if let Some(offset) = config.lowest_port().and_then(|low| base.checked_sub(low)) {
            return offset;
        }
    }

    if let (Some(manifest), Some(primary)) = (manifest, config.primary_port()) {
        if let Some(offset) = manifest
            .host_ports
            .get(&primary)
            .and_then(|host| host.checked_sub(primary))
        {
            return offset;
        }
    }

    0
}

/// Domain resolution: LAN variable, proxy route by app port, template, default
pub fn resolve_domain(
    env: &EnvFile,
    routes: &RouteIndex,
    config: &DashConfig,
    app_port: Option<u16>,
    alias: &str,
    name: &str,
    branch: &str,
) -> String {
    if let Some(lan) = env.value(&config.vars.lan_domain) {
        return lan.to_string();
    }

    if let Some(host) = app_port.and_then(|port| routes.host_for(port, alias)) {
        return host.to_string();
    }

    if let Some(domain) = naming::templated_domain(config, alias, name, branch) {
        return domain;
    }

    naming::default_domain(alias)
}

/// Branch checked out in a worktree, read from its git HEAD
pub fn read_git_branch(dir: &Path) -> Option<String> {
    let git_dir = git_dir(dir)?;
    let head = std::fs::read_to_string(git_dir.join("HEAD")).ok()?;
    let head = head.trim();
    if let Some(reference) = head.strip_prefix("ref:") {
        let reference = reference.trim();
        return Some(
            reference
                .strip_prefix("refs/heads/")
                .unwrap_or(reference)
                .to_string(),
        );
    }
    // Detached HEAD
    Some(head.chars().take(7).collect()).filter(|s: &String| !s.is_empty())
}

fn git_dir(dir: &Path) -> Option<PathBuf> {
    let marker = dir.join(".git");
    if marker.is_dir() {
        return Some(marker);
    }
    let content = std::fs::read_to_string(&marker).ok()?;
    let pointer = content.trim().strip_prefix("gitdir:")?.trim();
    let pointer = PathBuf::from(pointer);
    Some(if pointer.is_relative() {
        dir.join(pointer)
    } else {
        pointer
    })
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
