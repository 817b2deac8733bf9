//! Broadcast fan-out for breaker events.

use crate::events::events::{emit_event, BreakerEvent};

use tokio::sync::broadcast;

/// Default number of buffered events per bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A typed many-subscriber channel of [`BreakerEvent`]s.
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded;
/// publishing never blocks.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BreakerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Logs the event and delivers it to every subscriber.
    ///
    /// Returns the number of subscribers that will see it.
    pub fn publish(&self, event: BreakerEvent) -> usize {
        emit_event(&event);
        self.sender.send(event).unwrap_or(0)
    }

    /// Delivers the event without logging it again.
    pub(crate) fn forward(&self, event: BreakerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
