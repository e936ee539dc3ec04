//! Core data types
//!
//! Keys, versioned values, entries, and request statistics shared by every
//! store implementation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Maximum key length in bytes
pub const MAX_KEY_LEN: usize = 255;

// =============================================================================
// Key
// =============================================================================

/// A store key
///
/// Valid keys are non-empty, at most [`MAX_KEY_LEN`] bytes, and contain no
/// null byte. Construction does not validate; stores call [`Key::validate`]
/// before taking any lock so the error is reported per operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Create a key (unvalidated)
    pub fn new(key: impl Into<String>) -> Self {
        Key(key.into())
    }

    /// Check the key against the store's key rules
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(KvError::InvalidKey("key is empty".to_string()));
        }
        if self.0.len() > MAX_KEY_LEN {
            return Err(KvError::InvalidKey(format!(
                "key is {} bytes (max {})",
                self.0.len(),
                MAX_KEY_LEN
            )));
        }
        if self.0.as_bytes().contains(&0) {
            return Err(KvError::InvalidKey("key contains a null byte".to_string()));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Value / Entry
// =============================================================================

/// A stored value with its version metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    /// The payload
    pub data: String,

    /// Fixed at first insertion
    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation (always >= created_at)
    pub updated_at: DateTime<Utc>,

    /// Starts at 1, +1 per successful mutation
    pub version: i64,
}

impl Value {
    /// A fresh value at version 1
    pub(crate) fn first(data: String, now: DateTime<Utc>) -> Self {
        Self {
            data,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// The successor of this value carrying new data
    pub(crate) fn next(&self, data: String, now: DateTime<Utc>) -> Self {
        Self {
            data,
            created_at: self.created_at,
            // Clock steps backwards must not break updated_at >= created_at
            updated_at: now.max(self.created_at),
            version: self.version + 1,
        }
    }

    /// True for a zero value (never stored)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.version == 0
    }
}

/// A read-only key/value projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Key,
    pub value: Value,
}

// =============================================================================
// Statistics
// =============================================================================

/// Request counters for a store
///
/// Counters missing from a stored document read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreStats {
    pub total_keys: u64,
    pub total_requests: u64,
    pub get_requests: u64,
    pub set_requests: u64,
    pub delete_requests: u64,
}
