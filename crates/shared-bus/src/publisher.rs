//! # Event Publisher
//!
//! The publishing side of the bus: one `tokio::sync::broadcast` channel,
//! filtered per subscription on the receiving side.

use crate::events::{EventFilter, NodeEvent};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, trace};

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Returns how many subscriptions the event reached.
    async fn publish(&self, event: NodeEvent) -> usize;
}

pub struct InMemoryEventBus {
    sender: broadcast::Sender<NodeEvent>,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// A bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, "[bus] Subscribed");
        Subscription::new(self.sender.subscribe(), filter)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: NodeEvent) -> usize {
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(?topic, receivers, "[bus] Event published");
                receivers
            }
            Err(_) => {
                // Observers are optional; an unobserved event is not a fault.
                trace!(?topic, "[bus] Event dropped, no subscribers");
                0
            }
        }
    }
}
