//! Store Module
//!
//! The caller-facing key-value contract and its in-memory implementation.
//!
//! ## Responsibilities
//! - Thread-safe CRUD over a versioned key space
//! - Optimistic concurrency through compare-and-swap on versions
//! - Deadline/cancellation checks before any lock is taken
//!
//! ## Concurrency Model
//! A single map-wide `RwLock`:
//! - Reads (get/exists/list/size) share the lock
//! - Mutations (set/delete/clear/cas) hold it exclusively
//!
//! Every keyed operation validates its key first, then checks the
//! [`Context`], and only then acquires the lock.

mod value_store;

pub use value_store::ValueStore;

use crate::context::Context;
use crate::error::Result;
use crate::types::{Entry, Key, StoreStats, Value};

/// The Store contract
///
/// [`ValueStore`] and [`crate::DurableStore`] implement it identically from a
/// caller's point of view; persistence is invisible through this trait.
pub trait Store: Send + Sync {
    /// Get the value for `key` (`KeyNotFound` if absent)
    fn get(&self, ctx: &Context, key: &Key) -> Result<Value>;

    /// Insert or overwrite `key`; version starts at 1 and increments by 1
    fn set(&self, ctx: &Context, key: &Key, data: &str) -> Result<()>;

    /// Remove `key` and return the value it held
    fn delete(&self, ctx: &Context, key: &Key) -> Result<Value>;

    /// All keys at call time (empty when the store is empty)
    fn list(&self, ctx: &Context) -> Result<Vec<Key>>;

    /// All entries at call time (empty when the store is empty)
    fn list_entries(&self, ctx: &Context) -> Result<Vec<Entry>>;

    /// Current key count
    fn size(&self, ctx: &Context) -> Result<usize>;

    /// Atomically remove every key
    fn clear(&self, ctx: &Context) -> Result<()>;

    /// Whether `key` is present
    fn exists(&self, ctx: &Context, key: &Key) -> Result<bool>;

    /// Replace `key`'s data only if its version equals `expected_version`
    ///
    /// On a version mismatch the stored value is left untouched and returned
    /// inside [`crate::KvError::ConcurrentModification`]. Never retried
    /// internally.
    fn compare_and_swap(
        &self,
        ctx: &Context,
        key: &Key,
        expected_version: i64,
        data: &str,
    ) -> Result<Value>;

    /// Close the store; idempotent. Later operations return `StoreClosed`.
    fn close(&self) -> Result<()>;

    /// Request counters
    fn stats(&self) -> StoreStats;
}
