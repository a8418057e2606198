//! In-process publish/subscribe surface backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use crate::event::LocalEvent;

/// Publisher/subscriber handle for lifecycle events.
///
/// Cloning is cheap; all clones share the same underlying channel. Publish
/// is fire-and-forget: errors (no active subscribers) are logged but never
/// propagate to the caller, because the primary write has already committed
/// by the time an event is published.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LocalEvent>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: LocalEvent) {
        let event_id = event.event_id;
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(
                target: "scim_delivery",
                event_id = %event_id,
                error = %e,
                "No active subscribers to receive lifecycle event"
            );
        }
    }

    /// Get a new receiver for the broadcast channel.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LocalEvent> {
        self.sender.subscribe()
    }

    /// Number of currently attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
