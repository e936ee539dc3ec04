//! Error types for DuraKV
//!
//! Provides a unified error type for store, persistence, and configuration
//! operations.

use thiserror::Error;

use crate::types::Value;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for DuraKV operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Key not found")]
    KeyNotFound,

    #[error("Store is closed")]
    StoreClosed,

    /// Compare-and-swap lost; carries the value that is actually stored
    #[error("Concurrent modification detected (current version {})", .current.version)]
    ConcurrentModification { current: Box<Value> },

    // -------------------------------------------------------------------------
    // Context Errors
    // -------------------------------------------------------------------------
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Operation cancelled")]
    Cancelled,

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("No snapshot found")]
    NoSnapshotFound,

    #[error("Snapshot data is corrupted: {0}")]
    SnapshotCorrupted(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Persistence not configured")]
    PersistenceNotConfigured,

    #[error("Persistence {operation} error: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: Box<KvError>,
    },

    #[error("Failed to save after {attempts} attempts: {source}")]
    SaveFailed {
        attempts: u32,
        #[source]
        source: Box<KvError>,
    },

    // -------------------------------------------------------------------------
    // I/O and Serialization Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Wrap an error with the persistence operation that produced it
    pub fn persistence(operation: &'static str, source: KvError) -> Self {
        KvError::Persistence {
            operation,
            source: Box::new(source),
        }
    }

    /// Strip `Persistence` wrappers down to the underlying cause
    pub fn root_cause(&self) -> &KvError {
        match self {
            KvError::Persistence { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The stored value attached to a lost compare-and-swap
    pub fn current_value(&self) -> Option<&Value> {
        match self {
            KvError::ConcurrentModification { current } => Some(current),
            _ => None,
        }
    }

    /// True when the backend reported that no snapshot exists yet
    pub fn is_no_snapshot(&self) -> bool {
        matches!(self.root_cause(), KvError::NoSnapshotFound)
    }

    /// True when the loaded snapshot failed to decode or validate
    pub fn is_corrupted_snapshot(&self) -> bool {
        matches!(self.root_cause(), KvError::SnapshotCorrupted(_))
    }
}

impl From<serde_json::Error> for KvError {
    fn from(err: serde_json::Error) -> Self {
        KvError::Serialization(err.to_string())
    }
}
