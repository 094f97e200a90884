//! Table of conversions that are currently in flight.
//!
//! Each entry owns one [`oneshot`] sender per registered waiter. Registering,
//! joining, delivering and removing all happen under one mutex, and the lock
//! is never held across an `.await`.

use crate::error::ErrorKind;
use crate::key::ThumbnailKey;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// What a single conversion produced, as delivered to each of its waiters.
pub(crate) type Outcome = std::result::Result<(), ErrorKind>;

/// A waiter's private end of the fan-out.
#[derive(Debug)]
pub(crate) struct WaitHandle {
    receiver: oneshot::Receiver<Outcome>,
}

impl WaitHandle {
    /// Wait for the conversion this handle was registered against.
    pub(crate) async fn wait(self) -> Outcome {
        // The sender only disappears without sending if the entry was dropped
        // wholesale, which the scheduler's completion guard prevents.
        self.receiver.await.unwrap_or(Err(ErrorKind::Abandoned))
    }
}

/// Result of [`PendingTable::register_or_join`].
#[derive(Debug)]
pub(crate) enum Registration {
    /// No conversion was pending for the key; the caller must start one.
    Owner(WaitHandle),
    /// A conversion is already pending; the caller only waits.
    Joined(WaitHandle),
}

impl Registration {
    pub(crate) fn is_owner(&self) -> bool {
        matches!(self, Self::Owner(_))
    }

    pub(crate) fn into_handle(self) -> WaitHandle {
        match self {
            Self::Owner(handle) | Self::Joined(handle) => handle,
        }
    }
}

#[derive(Debug)]
struct PendingRequest {
    waiters: Vec<oneshot::Sender<Outcome>>,
    since: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<ThumbnailKey, PendingRequest>>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ThumbnailKey, PendingRequest>> {
        // Nothing inside the critical sections can leave the map half-updated,
        // so a panic elsewhere while holding the lock doesn't invalidate it.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register interest in `key`, creating its entry if none is pending.
    ///
    /// Exactly one of any number of concurrent callers for the same key
    /// receives [`Registration::Owner`].
    pub(crate) fn register_or_join(&self, key: &ThumbnailKey) -> Registration {
        let (sender, receiver) = oneshot::channel();
        let handle = WaitHandle { receiver };
        let mut entries = self.lock();
        match entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let pending = entry.get_mut();
                pending.waiters.push(sender);
                tracing::debug!(
                    key = %key,
                    waiters = pending.waiters.len(),
                    "Joining pending thumbnail conversion"
                );
                Registration::Joined(handle)
            },
            Entry::Vacant(entry) => {
                entry.insert(PendingRequest {
                    waiters: vec![sender],
                    since: Instant::now(),
                });
                tracing::debug!(key = %key, pending = entries.len(), "Registered new thumbnail conversion");
                Registration::Owner(handle)
            },
        }
    }

    /// Deliver `outcome` to every waiter registered for `key` and remove the
    /// entry. Returns how many waiters were registered.
    ///
    /// Waiters that have since gone away are skipped silently. Once this
    /// returns, the next registration for `key` becomes a new owner.
    pub(crate) fn complete_and_remove(&self, key: &ThumbnailKey, outcome: &Outcome) -> usize {
        let mut entries = self.lock();
        let Some(pending) = entries.remove(key) else {
            tracing::warn!(key = %key, "Completed a thumbnail conversion that was not pending");
            return 0;
        };
        let waiters = pending.waiters.len();
        for waiter in pending.waiters {
            _ = waiter.send(outcome.clone());
        }
        tracing::debug!(
            key = %key,
            waiters,
            elapsed = ?pending.since.elapsed(),
            "Delivered thumbnail conversion outcome"
        );
        waiters
    }

    /// Number of keys with a pending conversion.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &ThumbnailKey) -> bool {
        self.lock().contains_key(key)
    }

    #[cfg(test)]
    pub(crate) fn waiters(&self, key: &ThumbnailKey) -> Option<usize> {
        self.lock().get(key).map(|pending| pending.waiters.len())
    }

    /// Age of the oldest pending conversion.
    pub(crate) fn oldest(&self) -> Option<Duration> {
        self.lock().values().map(|pending| pending.since.elapsed()).max()
    }
}
