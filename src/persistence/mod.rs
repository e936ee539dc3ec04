//! Persistence Module
//!
//! Saving and loading whole-store snapshots to an external medium.
//!
//! ## Responsibilities
//! - Define the persistence contract consumed by [`crate::DurableStore`]
//! - Provide an atomic, concurrency-safe file backend
//!
//! ## File Format
//! A single JSON document:
//! ```text
//! {
//!   "data":      { "<key>": "<data>", ... },
//!   "stats":     { "total_keys": N, "total_requests": N, ... },
//!   "version":   "1.0",
//!   "timestamp": <unix seconds>
//! }
//! ```
//!
//! ## Atomicity
//! Saves write `<path>.tmp.<random hex>`, fsync it, and rename it over
//! `<path>`. A concurrent load sees either the old or the new file whole.

mod file;
mod snapshot;

pub use file::FileSnapshotPersistence;
pub use snapshot::{Snapshot, SNAPSHOT_FORMAT_VERSION};

use crate::error::Result;

/// The persistence contract
///
/// Implementations must not retain the snapshot beyond a single call.
pub trait SnapshotPersistence: Send + Sync {
    /// Persist a full snapshot, replacing the previous one
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Load the last saved snapshot
    ///
    /// Fails with an error for which [`crate::KvError::is_no_snapshot`] holds
    /// when nothing has been saved yet.
    fn load(&self) -> Result<Snapshot>;
}
