//! Call-site introspection
//!
//! Counts which call sites produce which media types (and for which
//! routes). Counts only grow; cardinality is bounded by the number of
//! distinct production sites in a codebase, not by traffic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Key of one introspection record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublishKey {
    pub media_type: String,
    pub route: Option<String>,
    pub call_function: String,
    pub call_module: String,
}

/// Snapshot of one introspection record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishInfo {
    pub media_type: String,
    pub route: Option<String>,
    pub call_function: String,
    pub call_module: String,
    pub count: u64,
}

/// Thread-safe counter of [`PublishKey`]s
#[derive(Debug, Default)]
pub struct IntrospectionAggregator {
    counts: Mutex<HashMap<PublishKey, u64>>,
}

impl IntrospectionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a count half-written.
    fn lock(&self) -> MutexGuard<'_, HashMap<PublishKey, u64>> {
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Increment the count for `key`, creating it at 1 if absent
    pub fn record(&self, key: PublishKey) {
        *self.lock().entry(key).or_insert(0) += 1;
    }

    /// Materialize every record, ordered by key
    pub fn snapshot(&self) -> Vec<PublishInfo> {
        let mut entries: Vec<(PublishKey, u64)> = self
            .lock()
            .iter()
            .map(|(key, count)| (key.clone(), *count))
            .collect();
        entries.sort();

        entries
            .into_iter()
            .map(|(key, count)| PublishInfo {
                media_type: key.media_type,
                route: key.route,
                call_function: key.call_function,
                call_module: key.call_module,
                count,
            })
            .collect()
    }

    /// Number of distinct records
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.lock().values().sum()
    }
}
