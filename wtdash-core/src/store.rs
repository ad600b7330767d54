//! Versioned environment snapshot.
//!
//! Writers build a complete replacement list and swap it in; readers hold an
//! `Arc` to whichever list was current and never observe a half-applied
//! update. Backed by a `tokio::sync::watch` channel so the dashboard can also
//! await changes.

use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::watch;

use crate::discover::carry_over;
use crate::model::Environment;

#[derive(Clone, Debug)]
pub struct Snapshot {
    pub version: u64,
    pub environments: Arc<Vec<Environment>>,
    pub updated_at: Option<SystemTime>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: 0,
            environments: Arc::new(Vec::new()),
            updated_at: None,
        }
    }
}

impl Snapshot {
    pub fn find(&self, key: &str) -> Option<&Environment> {
        self.environments
            .iter()
            .find(|e| e.alias == key || e.name == key)
    }
}

#[derive(Clone, Debug)]
pub struct EnvStore {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl Default for EnvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Publish a freshly discovered list. Observed fields are carried over
    /// from the list current at swap time, so a probe merge that landed
    /// while discovery was scanning is not lost.
    pub fn publish_discovery(&self, mut envs: Vec<Environment>) -> u64 {
        self.modify(move |current| {
            carry_over(&mut envs, current);
            crate::model::sort_environments(&mut envs);
            Some(envs)
        })
    }

    /// Apply a whole-list transformation. Returning `None` leaves the
    /// snapshot untouched. `f` runs under the channel lock and must not block.
    pub fn modify<F>(&self, f: F) -> u64
    where
        F: FnOnce(&[Environment]) -> Option<Vec<Environment>>,
    {
        let mut version = 0;
        self.tx.send_if_modified(|snapshot| {
            version = snapshot.version;
            let Some(next) = f(&snapshot.environments) else {
                return false;
            };
            snapshot.version += 1;
            snapshot.environments = Arc::new(next);
            snapshot.updated_at = Some(SystemTime::now());
            version = snapshot.version;
            true
        });
        version
    }

    /// Clone the current list, apply `f` to the copy, swap it in
    pub fn update<F>(&self, f: F) -> u64
    where
        F: FnOnce(&mut Vec<Environment>),
    {
        self.modify(|current| {
            let mut next = current.to_vec();
            f(&mut next);
            Some(next)
        })
    }
}
