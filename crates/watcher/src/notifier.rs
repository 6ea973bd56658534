//! Broadcast hub for change events

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default channel capacity; lagging subscribers skip older events
pub const DEFAULT_CAPACITY: usize = 64;

/// Pushed to subscribers when the database content changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub timestamp: DateTime<Utc>,
    /// Hex fingerprint of the new content
    pub fingerprint: String,
}

/// Fan-out of change events to every connected subscriber.
///
/// There is no replay: a subscriber only sees events published after it
/// subscribed.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to current subscribers; returns how many received it
    pub fn publish(&self, event: ChangeEvent) -> usize {
        // An error only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
