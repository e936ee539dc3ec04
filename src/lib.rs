//! # DuraKV
//!
//! A concurrency-safe, in-process key-value store with:
//! - Monotonic per-key versions and compare-and-swap
//! - Deadline/cancellation-aware operations
//! - Background, coalesced snapshot flushes with bounded retry
//! - Atomic (write-temp-then-rename) snapshot files
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Callers (HTTP handlers, CLI)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Store contract
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      DurableStore                            │
//! │     (sync forwarding + non-blocking save signal)             │
//! └──────────┬─────────────────────────────────┬────────────────┘
//!            │                                 │ bounded(1) queue
//!            ▼                                 ▼
//!   ┌─────────────────┐              ┌───────────────────┐
//!   │   ValueStore    │◀─list_entries─│   Flush worker    │◀── ticker
//!   │    (RwLock)     │              │  (retry, logging) │
//!   └─────────────────┘              └─────────┬─────────┘
//!                                              │ save / load
//!                                              ▼
//!                                   ┌─────────────────────┐
//!                                   │ FileSnapshotPersist. │
//!                                   │  (tmp + rename)      │
//!                                   └─────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod context;
pub mod types;

pub mod store;
pub mod persistence;
pub mod durable;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, DurabilityConfig};
pub use context::Context;
pub use types::{Entry, Key, StoreStats, Value};
pub use store::{Store, ValueStore};
pub use persistence::{FileSnapshotPersistence, Snapshot, SnapshotPersistence};
pub use durable::DurableStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of DuraKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
