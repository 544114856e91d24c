//! Broadcast channel for reading snapshots.
//!
//! [`ReadingBus`] wraps a [`tokio::sync::broadcast`] channel. Every time the
//! [`super::ReadingCache`] is refreshed it publishes a snapshot, and every
//! listener (report renderer, chart, ...) subscribes to receive it.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::Reading;

/// Immutable copy of the cached readings at one point in time.
pub type Snapshot = Arc<[Reading]>;

/// Broadcast bus for [`Snapshot`]s.
///
/// When the ring buffer is full, the oldest snapshots are dropped for
/// lagging receivers; only the newest one matters to a listener anyway.
#[derive(Debug, Clone)]
pub struct ReadingBus {
    sender: broadcast::Sender<Snapshot>,
}

impl ReadingBus {
    /// Creates a new `ReadingBus` with the given channel capacity.
    ///
    /// A capacity of 0 is raised to 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a snapshot to all subscribers.
    ///
    /// Returns the number of receivers that received it. Without active
    /// receivers the snapshot is silently dropped.
    pub fn publish(&self, snapshot: Snapshot) -> usize {
        self.sender.send(snapshot).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future snapshots.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
