use std::collections::BTreeMap;

use tracing::{debug, warn};

use wtdash_core::docker::{self, StatsRecord};

use super::DOCKER;
use crate::exec::{CommandRunner, args};

/// One batch resource snapshot of every running container, keyed by name.
/// `None` when the engine can't be queried.
pub async fn probe_stats(runner: &dyn CommandRunner) -> Option<BTreeMap<String, StatsRecord>> {
    let output = runner
        .run(
            DOCKER,
            &args(&["stats", "--no-stream", "--format", "{{json .}}"]),
        )
        .await;

    match output {
        Ok(output) => {
            let stats = docker::parse_stats(&output);
            debug!(containers = stats.len(), "stats snapshot");
            Some(stats)
        }
        Err(e) => {
            warn!(error = %e, "stats snapshot failed, keeping previous values");
            None
        }
    }
}
