//! Decoding for container engine output.
//!
//! `docker ps` and `docker stats` print one JSON object per line with
//! `--format '{{json .}}'`; `docker inspect` prints a JSON array. Only the
//! fields the probes read are modelled, all optional.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::Health;

/// Compose label carrying the project working directory
pub const WORKDIR_LABEL: &str = "com.docker.compose.project.working_dir";

/// One `docker ps` line
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContainerRecord {
    #[serde(rename = "Names", default)]
    pub name: String,
    /// `running`, `exited`, `created`, ...
    #[serde(rename = "State", default)]
    pub state: String,
    /// Human status text, e.g. `Up 5 minutes (healthy)`
    #[serde(rename = "Status", default)]
    pub status: String,
    /// Comma-separated `key=value` pairs
    #[serde(rename = "Labels", default)]
    pub labels: String,
}

impl ContainerRecord {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.split(',').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k.trim() == key).then(|| v.trim())
        })
    }

    pub fn working_dir(&self) -> Option<PathBuf> {
        self.label(WORKDIR_LABEL)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }
}

/// One `docker stats --no-stream` line
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StatsRecord {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "CPUPerc", default)]
    pub cpu: String,
    /// `used / total`
    #[serde(rename = "MemUsage", default)]
    pub mem_usage: String,
    #[serde(rename = "MemPerc", default)]
    pub mem_pct: String,
}

impl StatsRecord {
    /// The "used" half of `used / total`
    pub fn mem_used(&self) -> &str {
        self.mem_usage
            .split('/')
            .next()
            .map(str::trim)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct InspectRecord {
    #[serde(rename = "State", default)]
    state: Option<InspectState>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct InspectState {
    #[serde(rename = "StartedAt", default)]
    started_at: Option<String>,
    #[serde(rename = "Health", default)]
    health: Option<InspectHealth>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct InspectHealth {
    #[serde(rename = "Status", default)]
    status: String,
}

/// Health and start time pulled from `docker inspect`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuntimeFacts {
    pub health: Health,
    pub started: Option<DateTime<Utc>>,
}

/// Parse newline-delimited JSON records, skipping lines that don't decode
pub fn parse_lines<T: for<'de> Deserialize<'de>>(output: &str) -> Vec<T> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

pub fn parse_ps(output: &str) -> Vec<ContainerRecord> {
    parse_lines(output)
}

/// Stats keyed by container name
pub fn parse_stats(output: &str) -> BTreeMap<String, StatsRecord> {
    parse_lines::<StatsRecord>(output)
        .into_iter()
        .filter(|r| !r.name.is_empty())
        .map(|r| (r.name.clone(), r))
        .collect()
}

/// First record of a `docker inspect` array
pub fn parse_inspect(output: &str) -> Result<RuntimeFacts, serde_json::Error> {
    let records: Vec<InspectRecord> = serde_json::from_str(output)?;
    let state = records
        .into_iter()
        .next()
        .and_then(|r| r.state)
        .unwrap_or_default();

    let health = state
        .health
        .map(|h| Health::from_engine(&h.status))
        .unwrap_or_default();
    let started = state
        .started_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        // The engine reports the zero time for never-started containers
        .filter(|t| t.timestamp() > 0);

    Ok(RuntimeFacts { health, started })
}
