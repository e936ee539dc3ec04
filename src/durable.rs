//! Durable Store Module
//!
//! Wraps a [`Store`] with background snapshot durability.
//!
//! ## Responsibilities
//! - Recover the last snapshot into the inner store on construction
//! - Request a flush after each successful mutation (when `auto_save`)
//! - Run a periodic flush timer
//! - Flush serially on a single worker thread, with bounded retry
//! - Shut down in a fixed order, exactly once
//!
//! ## Threads
//! ```text
//!   mutations ──try_send──┐
//!                         ▼
//!                  ┌─────────────┐        ┌──────────────────────┐
//!   ticker ─try_send─▶ bounded(1) ├──recv──▶ flush worker         │
//!                  └─────────────┘        │  list_entries → save │
//!                                         │  (retry, then log)   │
//!                                         └──────────────────────┘
//! ```
//! The queue has capacity 1: a signal sent while one is already pending is
//! dropped, so bursts of mutations collapse into one flush.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::Span;

use crate::config::{Config, DurabilityConfig};
use crate::context::Context;
use crate::error::{KvError, Result};
use crate::persistence::{FileSnapshotPersistence, Snapshot, SnapshotPersistence};
use crate::store::{Store, ValueStore};
use crate::types::{Entry, Key, StoreStats, Value};

/// Capacity of the save-signal queue
const SIGNAL_CAPACITY: usize = 1;

/// State shared between the caller-facing handle and the background threads
struct Shared<S> {
    /// The wrapped store; only touched through its Store contract
    store: S,

    persistence: Arc<dyn SnapshotPersistence>,

    config: DurabilityConfig,

    /// Set once at the start of close
    closed: AtomicBool,

    /// Held for the whole build-and-save of a snapshot
    flush_lock: Mutex<()>,

    span: Span,
}

/// A [`Store`] whose contents are periodically snapshotted to a
/// [`SnapshotPersistence`]
///
/// Callers never wait on disk I/O except in [`DurableStore::flush_now`] and
/// [`Store::close`]. Persistence failures during background flushes are
/// retried, then logged; they never fail a data operation.
pub struct DurableStore<S: Store + 'static> {
    shared: Arc<Shared<S>>,

    /// Producer side of the signal queue; taken on close
    signal_tx: RwLock<Option<Sender<()>>>,

    /// Dropping this stops the ticker; taken on close
    stop_tx: Mutex<Option<Sender<()>>>,

    /// Ticker and worker threads, joined on close
    threads: Mutex<Vec<JoinHandle<()>>>,

    /// True once close has run
    shutdown_done: Mutex<bool>,
}

impl DurableStore<ValueStore> {
    /// Open a fresh in-memory store backed by the configured snapshot file
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let persistence = FileSnapshotPersistence::from_config(config)?;
        Self::new(ValueStore::new(), Arc::new(persistence), config.durability())
    }
}

impl<S: Store + 'static> DurableStore<S> {
    /// Wrap `store`, recover the last snapshot into it, and start the
    /// background threads
    pub fn new(
        store: S,
        persistence: Arc<dyn SnapshotPersistence>,
        config: DurabilityConfig,
    ) -> Result<Self> {
        Self::with_span(store, persistence, config, tracing::info_span!("durable_store"))
    }

    /// Like [`DurableStore::new`], recording every event under `span`
    pub fn with_span(
        store: S,
        persistence: Arc<dyn SnapshotPersistence>,
        mut config: DurabilityConfig,
        span: Span,
    ) -> Result<Self> {
        if config.save_interval.is_zero() {
            config.save_interval = DurabilityConfig::default().save_interval;
        }

        let shared = Arc::new(Shared {
            store,
            persistence,
            config,
            closed: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
            span,
        });

        // Recover before any caller can reach the store
        shared.load_existing();

        let (signal_tx, signal_rx) = channel::bounded::<()>(SIGNAL_CAPACITY);
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("durakv-flush".to_string())
                .spawn(move || shared.run_flush_worker(signal_rx))?
        };

        let ticker = {
            let shared = Arc::clone(&shared);
            let signals = signal_tx.clone();
            thread::Builder::new()
                .name("durakv-ticker".to_string())
                .spawn(move || shared.run_ticker(signals, stop_rx))?
        };

        Ok(Self {
            shared,
            signal_tx: RwLock::new(Some(signal_tx)),
            stop_tx: Mutex::new(Some(stop_tx)),
            threads: Mutex::new(vec![ticker, worker]),
            shutdown_done: Mutex::new(false),
        })
    }

    /// Build and persist a snapshot now, with the retry policy
    ///
    /// Blocks until the save (including retries) finishes.
    pub fn flush_now(&self) -> Result<usize> {
        self.ensure_open()?;
        self.shared.flush()
    }

    /// Get the wrapped store
    pub fn inner(&self) -> &S {
        &self.shared.store
    }

    /// Get the durability configuration in effect
    pub fn config(&self) -> &DurabilityConfig {
        &self.shared.config
    }

    /// Whether close has started
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(KvError::StoreClosed);
        }
        Ok(())
    }

    /// Non-blocking, coalescing save request after a mutation
    fn after_mutation(&self) {
        if !self.shared.config.auto_save {
            return;
        }
        if let Some(tx) = self.signal_tx.read().as_ref() {
            self.shared.request_save(tx);
        }
    }

    fn shutdown(&self) -> Result<()> {
        let _enter = self.shared.span.enter();

        // 1. Refuse further operations and stop the ticker
        self.shared.closed.store(true, Ordering::SeqCst);
        drop(self.stop_tx.lock().take());

        // 2. Final snapshot
        let mut result = Ok(());
        if self.shared.config.save_on_shutdown {
            match self.shared.flush() {
                Ok(entries) => tracing::info!(entries, "final snapshot saved on shutdown"),
                Err(e) => {
                    tracing::error!(error = %e, "failed to save final snapshot");
                    result = Err(e);
                }
            }
        }

        // 3. Close the queue and wait for both threads
        drop(self.signal_tx.write().take());
        for handle in self.threads.lock().drain(..) {
            if handle.join().is_err() {
                tracing::error!("durability thread panicked");
            }
        }

        // 4. Close the wrapped store
        if let Err(e) = self.shared.store.close() {
            tracing::error!(error = %e, "failed to close underlying store");
            if result.is_ok() {
                result = Err(e);
            }
        }

        result
    }
}

impl<S: Store> Shared<S> {
    /// Replay the last snapshot into the store, one key at a time
    ///
    /// "No snapshot" starts empty silently; any other failure is logged and
    /// the store still starts (empty).
    fn load_existing(&self) {
        let _enter = self.span.enter();

        let snapshot = match self.persistence.load() {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_no_snapshot() => {
                tracing::debug!("no existing snapshot found, starting with empty store");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load existing data, starting with empty store");
                return;
            }
        };

        for (key, data) in &snapshot.data {
            let ctx = Context::with_timeout(self.config.op_timeout);
            if let Err(e) = self.store.set(&ctx, &Key::from(key.as_str()), data) {
                tracing::error!(key = %key, error = %e, "failed to load key into store");
            }
        }

        tracing::info!(entries = snapshot.len(), "loaded data from persistence");
    }

    /// Enqueue a save signal unless one is already pending
    fn request_save(&self, signals: &Sender<()>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match signals.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => tracing::trace!("save already pending"),
            Err(TrySendError::Disconnected(())) => {}
        }
    }

    /// Serialized build-and-save
    fn flush(&self) -> Result<usize> {
        let _flush = self.flush_lock.lock();
        self.flush_locked()
    }

    /// Build-and-save; caller holds `flush_lock`
    fn flush_locked(&self) -> Result<usize> {
        let snapshot = self.build_snapshot()?;
        self.save_with_retry(&snapshot)?;
        Ok(snapshot.len())
    }

    fn build_snapshot(&self) -> Result<Snapshot> {
        let ctx = Context::with_timeout(self.config.op_timeout.saturating_mul(2));
        let entries = self.store.list_entries(&ctx)?;
        Ok(Snapshot::from_entries(entries, self.store.stats()))
    }

    /// One attempt plus `retry_attempts` retries, `retry_delay` apart
    fn save_with_retry(&self, snapshot: &Snapshot) -> Result<()> {
        let attempts = self.config.retry_attempts.saturating_add(1);
        let mut attempt = 1;

        loop {
            match self.persistence.save(snapshot) {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "save succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "save attempt failed");
                    thread::sleep(self.config.retry_delay);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "save attempt failed");
                    return Err(KvError::SaveFailed {
                        attempts,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    /// Consume save signals until the queue is closed
    fn run_flush_worker(&self, signals: Receiver<()>) {
        let _enter = self.span.enter();

        for () in signals.iter() {
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            let _flush = self.flush_lock.lock();
            // Close may have started (and saved) while we waited
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            match self.flush_locked() {
                Ok(entries) => tracing::debug!(entries, "snapshot saved successfully"),
                Err(e) => tracing::error!(error = %e, "failed to save snapshot"),
            }
        }
    }

    /// Emit a save signal every `save_interval` until stopped
    fn run_ticker(&self, signals: Sender<()>, stop: Receiver<()>) {
        let _enter = self.span.enter();
        let interval: Duration = self.config.save_interval;

        loop {
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if self.closed.load(Ordering::SeqCst) {
                        break;
                    }
                    self.request_save(&signals);
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl<S: Store + 'static> Store for DurableStore<S> {
    fn get(&self, ctx: &Context, key: &Key) -> Result<Value> {
        self.ensure_open()?;
        self.shared.store.get(ctx, key)
    }

    fn set(&self, ctx: &Context, key: &Key, data: &str) -> Result<()> {
        self.ensure_open()?;
        self.shared.store.set(ctx, key, data)?;
        self.after_mutation();
        Ok(())
    }

    fn delete(&self, ctx: &Context, key: &Key) -> Result<Value> {
        self.ensure_open()?;
        let value = self.shared.store.delete(ctx, key)?;
        self.after_mutation();
        Ok(value)
    }

    fn list(&self, ctx: &Context) -> Result<Vec<Key>> {
        self.ensure_open()?;
        self.shared.store.list(ctx)
    }

    fn list_entries(&self, ctx: &Context) -> Result<Vec<Entry>> {
        self.ensure_open()?;
        self.shared.store.list_entries(ctx)
    }

    fn size(&self, ctx: &Context) -> Result<usize> {
        self.ensure_open()?;
        self.shared.store.size(ctx)
    }

    fn clear(&self, ctx: &Context) -> Result<()> {
        self.ensure_open()?;
        self.shared.store.clear(ctx)?;
        // Signals even when the store was already empty
        self.after_mutation();
        Ok(())
    }

    fn exists(&self, ctx: &Context, key: &Key) -> Result<bool> {
        self.ensure_open()?;
        self.shared.store.exists(ctx, key)
    }

    fn compare_and_swap(
        &self,
        ctx: &Context,
        key: &Key,
        expected_version: i64,
        data: &str,
    ) -> Result<Value> {
        self.ensure_open()?;
        let value = self
            .shared
            .store
            .compare_and_swap(ctx, key, expected_version, data)?;
        self.after_mutation();
        Ok(value)
    }

    /// Runs the shutdown sequence once; later (or concurrent) calls wait for
    /// it and then return `Ok(())`
    fn close(&self) -> Result<()> {
        let mut done = self.shutdown_done.lock();
        if *done {
            return Ok(());
        }
        *done = true;
        self.shutdown()
    }

    fn stats(&self) -> StoreStats {
        self.shared.store.stats()
    }
}

impl<S: Store + 'static> Drop for DurableStore<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "close on drop failed");
        }
    }
}
