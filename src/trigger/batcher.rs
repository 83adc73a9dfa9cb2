//! # Batcher: groups events for sources that dispatch in batches.
//!
//! ```text
//! add(event, handle) ──► [batch] ──len == size──► notify "full"
//!
//! wait_for_batch(timeout):
//!   ├─ while empty: sleep(empty_poll_interval)
//!   ├─ wait for "full" or timeout (measured from the first event seen)
//!   └─ take up to `size` events: events + { event id → handle },
//!      anything beyond stays queued for the next batch
//! ```
//!
//! Identifiers are unique within a batch: an event arriving without one, or
//! with one already taken by an earlier event of the same batch, gets a fresh id.
//!
//! The handle type is up to the source; usually the sending half of a oneshot
//! channel the requester waits on.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::event::{Event, EventId};
use crate::trigger::BatchConfig;

/// An extracted batch.
#[derive(Debug)]
pub struct Batch<H> {
    /// Events in arrival order, each with an identifier.
    pub events: Vec<Event>,
    /// Caller handle per event identifier.
    pub handles: HashMap<EventId, H>,
}

impl<H> Batch<H> {
    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when the batch holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Accumulates `(event, handle)` pairs until a batch is full or times out.
pub struct Batcher<H> {
    batch_size: usize,
    empty_poll_interval: Duration,
    pending: Mutex<Vec<(Event, H)>>,
    full: Notify,
}

impl<H> Batcher<H> {
    /// Creates a batcher flushing at `batch_size` events (min 1).
    pub fn new(batch_size: usize) -> Self {
        Self::from_config(&BatchConfig {
            batch_size,
            ..BatchConfig::default()
        })
    }

    /// Creates a batcher from a trigger's batch settings.
    pub fn from_config(config: &BatchConfig) -> Self {
        let batch_size = config.batch_size_clamped();
        Self {
            batch_size,
            empty_poll_interval: config.empty_poll_interval,
            pending: Mutex::new(Vec::with_capacity(batch_size)),
            full: Notify::new(),
        }
    }

    /// Capacity of one batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.lock_pending().len()
    }

    /// True when no event is waiting.
    pub fn is_empty(&self) -> bool {
        self.lock_pending().is_empty()
    }

    /// Appends an event. Returns true if this filled the batch.
    pub fn add(&self, event: Event, handle: H) -> bool {
        let mut pending = self.lock_pending();
        pending.push((event, handle));
        let full = pending.len() >= self.batch_size;
        drop(pending);

        if full {
            self.full.notify_one();
        }
        full
    }

    /// Waits for a batch and takes it.
    ///
    /// Returns as soon as the batch is full, or `timeout` after the first event
    /// was seen, whichever comes first. Never returns an empty batch.
    pub async fn wait_for_batch(&self, timeout: Duration) -> Batch<H> {
        while self.is_empty() {
            tokio::time::sleep(self.empty_poll_interval).await;
        }

        let deadline = Instant::now() + timeout;
        while self.len() < self.batch_size {
            tokio::select! {
                _ = self.full.notified() => {}
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
        self.take()
    }

    fn take(&self) -> Batch<H> {
        let drained: Vec<(Event, H)> = {
            let mut pending = self.lock_pending();
            let n = pending.len().min(self.batch_size);
            pending.drain(..n).collect()
        };

        let mut events = Vec::with_capacity(drained.len());
        let mut handles = HashMap::with_capacity(drained.len());
        for (mut event, handle) in drained {
            let mut id = event.ensure_id().clone();
            if handles.contains_key(&id) {
                id = EventId::generate();
                event.id = Some(id.clone());
            }
            handles.insert(id, handle);
            events.push(event);
        }
        Batch { events, handles }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<(Event, H)>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }
}
