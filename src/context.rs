//! Operation Context
//!
//! Deadline and cancellation carried into every synchronous store call.
//!
//! A `Context` is cheap to clone; clones share the cancellation flag, so
//! cancelling any clone cancels them all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{KvError, Result};

/// Deadline and cancellation state for a store operation
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Point in time after which the operation must not start
    deadline: Option<Instant>,

    /// Shared cancellation flag
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// A context with no deadline that is never cancelled unless asked to
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now
    ///
    /// A timeout too large to represent as an `Instant` means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::background(),
        }
    }

    /// A context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Get the deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline (`None` when unbounded)
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail if the context has been cancelled or its deadline has passed
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(KvError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(KvError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
