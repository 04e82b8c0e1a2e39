use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// String-to-string label map attached to tenants and regional systems.
///
/// Uses `BTreeMap` for deterministic serialization order.
pub type Labels = BTreeMap<String, String>;

/// Owner of a tenant (e.g. the customer account that requested it).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Identifier of the owning entity.
    pub id: String,
    /// Kind of the owning entity (e.g. `"customer"`).
    pub owner_type: String,
}

/// Wall-clock time in milliseconds since the Unix epoch.
///
/// A clock set before the epoch reads as 0.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Merges `updates` into `labels`, overwriting existing keys.
pub fn merge_labels(labels: &mut Labels, updates: &Labels) {
    for (key, value) in updates {
        labels.insert(key.clone(), value.clone());
    }
}

/// Removes each of `keys` from `labels`. Missing keys are ignored.
pub fn remove_labels(labels: &mut Labels, keys: &[String]) {
    for key in keys {
        labels.remove(key);
    }
}
