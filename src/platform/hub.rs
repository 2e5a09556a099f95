//! Message Hub
//!
//! In-process fan-out of inbound messages to per-channel subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::debug;

use super::SourceMessage;

type Subscribers = HashMap<String, Vec<(u64, mpsc::UnboundedSender<SourceMessage>)>>;

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: Mutex<Subscribers>,
}

impl HubInner {
    fn unsubscribe(&self, channel_id: &str, id: u64) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = subscribers.get_mut(channel_id) {
            list.retain(|(sub_id, _)| *sub_id != id);
            if list.is_empty() {
                subscribers.remove(channel_id);
            }
        }
    }
}

/// Routes published messages to every live subscription of their channel
#[derive(Clone, Default)]
pub struct MessageHub {
    inner: Arc<HubInner>,
}

impl MessageHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a subscription on a channel
    pub fn subscribe(&self, channel_id: &str) -> MessageSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel_id.to_string())
            .or_default()
            .push((id, tx));

        debug!(channel_id = %channel_id, subscription = id, "Opened message subscription");

        MessageSubscription {
            id,
            channel_id: channel_id.to_string(),
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver a message to the subscribers of its channel.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn publish(&self, message: &SourceMessage) -> usize {
        let mut subscribers = self.inner.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subscribers.get_mut(&message.channel_id) else {
            return 0;
        };

        list.retain(|(_, tx)| !tx.is_closed());
        let mut delivered = 0;
        for (_, tx) in list.iter() {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }

        if list.is_empty() {
            subscribers.remove(&message.channel_id);
        }
        delivered
    }

    /// Number of live subscriptions on a channel
    pub fn subscriber_count(&self, channel_id: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// A live stream of one channel's messages; unregisters itself on drop
pub struct MessageSubscription {
    id: u64,
    channel_id: String,
    rx: mpsc::UnboundedReceiver<SourceMessage>,
    hub: Weak<HubInner>,
}

impl MessageSubscription {
    /// Channel this subscription listens on
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Wait for the next message; `None` once the hub is gone
    pub async fn recv(&mut self) -> Option<SourceMessage> {
        self.rx.recv().await
    }
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            inner.unsubscribe(&self.channel_id, self.id);
            debug!(channel_id = %self.channel_id, subscription = self.id, "Closed message subscription");
        }
    }
}
