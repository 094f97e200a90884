//! Admission control for conversion subprocesses.

use crate::error::{ErrorKind, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of conversions allowed to run at once.
pub const DEFAULT_MAX_CONVERSIONS: usize = 4;

/// Counting gate bounding how many conversions run at the same time.
///
/// Tickets are anonymous: the pool only counts how many are outstanding.
/// Waiters are admitted in FIFO order.
#[derive(Debug, Clone)]
pub(crate) struct WorkTickets {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One outstanding unit of conversion capacity.
///
/// The ticket goes back to the pool when dropped, whatever the outcome of
/// the work it guarded.
#[derive(Debug)]
#[must_use = "dropping a work ticket immediately returns it to the pool"]
pub(crate) struct WorkTicket {
    _permit: OwnedSemaphorePermit,
}

impl WorkTickets {
    /// Create a pool with `capacity` tickets available and none outstanding.
    pub(crate) fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > Semaphore::MAX_PERMITS {
            exn::bail!(ErrorKind::InvalidConcurrency(Semaphore::MAX_PERMITS));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Wait until fewer than `capacity` tickets are outstanding, then take one.
    pub(crate) async fn acquire(&self) -> WorkTicket {
        // unwrap is safe: semaphore is never closed
        let permit = self.semaphore.clone().acquire_owned().await.unwrap();
        tracing::trace!(available = self.available(), "Acquired a work ticket");
        WorkTicket { _permit: permit }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tickets that could be acquired right now without waiting.
    pub(crate) fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
