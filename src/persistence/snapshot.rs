//! Snapshot definition
//!
//! A full point-in-time copy of every key's data plus metadata.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};
use crate::types::{Entry, StoreStats};

/// Current snapshot format tag
pub const SNAPSHOT_FORMAT_VERSION: &str = "1.0";

/// An immutable snapshot of the store
///
/// Only the latest `data` per key is kept; per-entry versions and
/// timestamps are not part of the format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// key → data
    pub data: BTreeMap<String, String>,

    /// Request counters at capture time (zeroed when absent)
    #[serde(default)]
    pub stats: StoreStats,

    /// Format tag (e.g. "1.0")
    pub version: String,

    /// Capture time (unix seconds)
    pub timestamp: i64,
}

impl Snapshot {
    /// Capture a snapshot from entries, stamped now with the current format tag
    pub fn from_entries(entries: Vec<Entry>, stats: StoreStats) -> Self {
        let data: BTreeMap<String, String> = entries
            .into_iter()
            .map(|e| (e.key.into_string(), e.value.data))
            .collect();

        let stats = StoreStats {
            total_keys: data.len() as u64,
            ..stats
        };

        Self {
            data,
            stats,
            version: SNAPSHOT_FORMAT_VERSION.to_string(),
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Structural validation: format tag present and timestamp positive
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(KvError::InvalidSnapshot("snapshot version is empty".to_string()));
        }
        if self.timestamp <= 0 {
            return Err(KvError::InvalidSnapshot(format!(
                "snapshot timestamp is invalid: {}",
                self.timestamp
            )));
        }
        Ok(())
    }

    /// Number of keys in the snapshot
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
