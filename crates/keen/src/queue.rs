//! Pending events awaiting a batched write.

use crate::event::{Event, EventBatch};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Pending {
    events: EventBatch,
    len: usize,
    oldest: Option<Instant>,
}

/// Events taken out of the queue, with the enqueue time of the oldest one.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub events: EventBatch,
    pub oldest: Option<Instant>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }
}

/// Per-collection event queue.
///
/// [`drain`](Self::drain) swaps the whole queue out under the lock, so events
/// enqueued while a drained snapshot is in flight land in the next snapshot.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Mutex<Pending>,
}

impl EventQueue {
    /// Create a new event queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event to a collection's queue. Returns the new total length.
    pub async fn enqueue(&self, collection: &str, event: Event) -> usize {
        let mut pending = self.pending.lock().await;
        pending
            .events
            .entry(collection.to_string())
            .or_default()
            .push(event);
        pending.len += 1;
        pending.oldest.get_or_insert_with(Instant::now);
        pending.len
    }

    /// Whether the queue has reached `max_events` or its oldest event is `max_age` old.
    pub async fn should_flush(&self, max_events: usize, max_age: Duration) -> bool {
        let pending = self.pending.lock().await;
        pending.len >= max_events
            || pending
                .oldest
                .map_or(false, |oldest| oldest.elapsed() >= max_age)
    }

    /// Get the number of queued events across all collections.
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len
    }

    /// Check if the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Take every queued event, leaving the queue empty.
    pub async fn drain(&self) -> Snapshot {
        let mut pending = self.pending.lock().await;
        let Pending { events, oldest, .. } = std::mem::take(&mut *pending);
        Snapshot { events, oldest }
    }

    /// Put a drained snapshot back in front of anything queued since.
    /// Used when sending the snapshot failed.
    ///
    /// The queue's age becomes the older of the snapshot's and its own.
    pub async fn requeue(&self, snapshot: Snapshot) {
        let added = snapshot.event_count();
        if added == 0 {
            return;
        }
        let mut pending = self.pending.lock().await;
        for (collection, mut events) in snapshot.events {
            let slot = pending.events.entry(collection).or_default();
            events.append(slot);
            *slot = events;
        }
        pending.len += added;
        pending.oldest = match (pending.oldest, snapshot.oldest) {
            (Some(queued), Some(requeued)) => Some(queued.min(requeued)),
            (queued, requeued) => queued.or(requeued).or_else(|| Some(Instant::now())),
        };
    }
}
