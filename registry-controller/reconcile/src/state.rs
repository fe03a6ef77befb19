use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

const SYNC_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The outcome of the last completed tick.
///
/// Only used for reporting. Pruning re-reads the gateway on every tick rather
/// than trusting this set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryState {
    names: BTreeSet<String>,
    last_sync: Option<DateTime<Utc>>,
}

impl RegistryState {
    pub(crate) fn synced(names: BTreeSet<String>, at: DateTime<Utc>) -> Self {
        Self {
            names,
            last_sync: Some(at),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    /// Renders the last sync time as `YYYY-MM-DD HH:MM:SS` (UTC).
    pub fn last_sync_display(&self) -> Option<String> {
        self.last_sync.map(|at| at.format(SYNC_TIME_FORMAT).to_string())
    }
}
