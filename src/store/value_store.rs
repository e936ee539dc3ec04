//! ValueStore implementation
//!
//! HashMap-based versioned store behind a parking_lot RwLock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;

use crate::context::Context;
use crate::error::{KvError, Result};
use crate::types::{Entry, Key, StoreStats, Value};

use super::Store;

/// Map state guarded by the store lock
struct Inner {
    data: HashMap<String, Value>,
    closed: bool,
}

/// Which counter a request bumps
#[derive(Debug, Clone, Copy)]
enum StatKind {
    Get,
    Set,
    Delete,
}

/// In-memory, concurrency-safe, versioned key-value store
///
/// ## Concurrency:
/// - `inner`: RwLock over the whole map (shared reads, exclusive mutations)
/// - request counters: atomics, updated without the map lock
pub struct ValueStore {
    inner: RwLock<Inner>,

    total_requests: AtomicU64,
    get_requests: AtomicU64,
    set_requests: AtomicU64,
    delete_requests: AtomicU64,
}

impl ValueStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a store with room for `capacity` keys before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                data: HashMap::with_capacity(capacity),
                closed: false,
            }),
            total_requests: AtomicU64::new(0),
            get_requests: AtomicU64::new(0),
            set_requests: AtomicU64::new(0),
            delete_requests: AtomicU64::new(0),
        }
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    fn record(&self, kind: StatKind) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            StatKind::Get => &self.get_requests,
            StatKind::Set => &self.set_requests,
            StatKind::Delete => &self.delete_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Key validation and context check, in that order, before locking
    fn precheck(ctx: &Context, key: Option<&Key>) -> Result<()> {
        if let Some(key) = key {
            key.validate()?;
        }
        ctx.check()
    }
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for ValueStore {
    fn get(&self, ctx: &Context, key: &Key) -> Result<Value> {
        Self::precheck(ctx, Some(key))?;

        let inner = self.inner.read();
        if inner.closed {
            return Err(KvError::StoreClosed);
        }
        self.record(StatKind::Get);

        inner
            .data
            .get(key.as_str())
            .cloned()
            .ok_or(KvError::KeyNotFound)
    }

    fn set(&self, ctx: &Context, key: &Key, data: &str) -> Result<()> {
        Self::precheck(ctx, Some(key))?;

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(KvError::StoreClosed);
        }
        self.record(StatKind::Set);

        let now = Utc::now();
        let value = match inner.data.get(key.as_str()) {
            Some(existing) => existing.next(data.to_string(), now),
            None => Value::first(data.to_string(), now),
        };
        inner.data.insert(key.as_str().to_string(), value);

        Ok(())
    }

    fn delete(&self, ctx: &Context, key: &Key) -> Result<Value> {
        Self::precheck(ctx, Some(key))?;

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(KvError::StoreClosed);
        }
        self.record(StatKind::Delete);

        inner.data.remove(key.as_str()).ok_or(KvError::KeyNotFound)
    }

    fn list(&self, ctx: &Context) -> Result<Vec<Key>> {
        Self::precheck(ctx, None)?;

        let inner = self.inner.read();
        if inner.closed {
            return Err(KvError::StoreClosed);
        }

        Ok(inner.data.keys().map(|k| Key::new(k.as_str())).collect())
    }

    fn list_entries(&self, ctx: &Context) -> Result<Vec<Entry>> {
        Self::precheck(ctx, None)?;

        let inner = self.inner.read();
        if inner.closed {
            return Err(KvError::StoreClosed);
        }

        Ok(inner
            .data
            .iter()
            .map(|(k, v)| Entry {
                key: Key::new(k.as_str()),
                value: v.clone(),
            })
            .collect())
    }

    fn size(&self, ctx: &Context) -> Result<usize> {
        Self::precheck(ctx, None)?;

        let inner = self.inner.read();
        if inner.closed {
            return Err(KvError::StoreClosed);
        }

        Ok(inner.data.len())
    }

    fn clear(&self, ctx: &Context) -> Result<()> {
        Self::precheck(ctx, None)?;

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(KvError::StoreClosed);
        }

        inner.data = HashMap::new();
        Ok(())
    }

    fn exists(&self, ctx: &Context, key: &Key) -> Result<bool> {
        Self::precheck(ctx, Some(key))?;

        let inner = self.inner.read();
        if inner.closed {
            return Err(KvError::StoreClosed);
        }

        Ok(inner.data.contains_key(key.as_str()))
    }

    fn compare_and_swap(
        &self,
        ctx: &Context,
        key: &Key,
        expected_version: i64,
        data: &str,
    ) -> Result<Value> {
        Self::precheck(ctx, Some(key))?;

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(KvError::StoreClosed);
        }
        self.record(StatKind::Set);

        let current = inner.data.get(key.as_str()).ok_or(KvError::KeyNotFound)?;
        if current.version != expected_version {
            return Err(KvError::ConcurrentModification {
                current: Box::new(current.clone()),
            });
        }

        let updated = current.next(data.to_string(), Utc::now());
        inner
            .data
            .insert(key.as_str().to_string(), updated.clone());

        Ok(updated)
    }

    fn close(&self) -> Result<()> {
        self.inner.write().closed = true;
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            total_keys: self.inner.read().data.len() as u64,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            get_requests: self.get_requests.load(Ordering::Relaxed),
            set_requests: self.set_requests.load(Ordering::Relaxed),
            delete_requests: self.delete_requests.load(Ordering::Relaxed),
        }
    }
}
