//! Fan-out of sync messages to subscribers.

use tokio::sync::broadcast;
use tracing::debug;

use crate::message::SyncMessage;

/// Delivers sync messages to whoever is listening.
///
/// `send` is fire-and-forget: implementations swallow their own delivery
/// failures so nothing propagates back into the coordinator.
pub trait Broadcaster: Send + Sync {
    /// Fan a message out to every live subscriber.
    fn send(&self, message: SyncMessage);

    /// Number of currently connected subscribers.
    fn subscriber_count(&self) -> usize;
}

/// Broadcaster backed by a [`tokio::sync::broadcast`] channel.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<SyncMessage>,
}

impl ChannelBroadcaster {
    /// Create a new broadcaster with specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive messages.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.sender.subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn send(&self, message: SyncMessage) {
        let event = message.event;
        match self.sender.send(message) {
            Ok(count) => {
                debug!("Broadcast {event:?} to {count} subscribers");
            }
            Err(_) => {
                // No receivers, this is fine
                debug!("Dropped {event:?}, no subscribers");
            }
        }
    }

    fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
