//! In-process publish/subscribe topics.
//!
//! The bus carries capability changes from the negotiation handler to
//! anything interested (SASL, user code) and channel activity from the
//! application to its consumers. Every subscriber runs on its own task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tether_proto::{Capability, Message};
use tracing::trace;

use super::handler::Subscriber;
use super::spawn_contained;
use crate::Connection;

/// Opaque handle returned by [`Topic::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Someone left a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPart {
    pub channel: String,
    pub nick: String,
    pub reason: Option<String>,
}

/// One event type's subscriber list.
pub struct Topic<E> {
    name: &'static str,
    ids: Arc<AtomicU64>,
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn Subscriber<E>>)>>,
}

impl<E: Send + Sync + 'static> Topic<E> {
    fn new(name: &'static str, ids: Arc<AtomicU64>) -> Self {
        Self {
            name,
            ids,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber<E>>) -> SubscriptionId {
        let id = SubscriptionId(self.ids.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        trace!(topic = self.name, ?id, "subscribed");
        id
    }

    /// Remove a subscription. Returns `false` if `id` was not subscribed here.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `event` to every current subscriber, each on its own task.
    pub fn publish(&self, conn: &Connection, event: E) -> usize {
        let event = Arc::new(event);
        let subscribers: Vec<_> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        trace!(topic = self.name, subscribers = subscribers.len(), "publish");
        for subscriber in &subscribers {
            let subscriber = Arc::clone(subscriber);
            let conn = conn.clone();
            let event = Arc::clone(&event);
            spawn_contained(self.name, async move { subscriber.notify(conn, event).await });
        }
        subscribers.len()
    }
}

/// Topics shared by one [`Connection`] across reconnects.
pub struct EventBus {
    capability_added: Topic<Capability>,
    capability_removed: Topic<Capability>,
    channel_part: Topic<ChannelPart>,
    channel_message: Topic<Message>,
}

impl EventBus {
    pub fn new() -> Self {
        let ids = Arc::new(AtomicU64::new(1));
        Self {
            capability_added: Topic::new("cap-add", ids.clone()),
            capability_removed: Topic::new("cap-del", ids.clone()),
            channel_part: Topic::new("channel-part", ids.clone()),
            channel_message: Topic::new("channel-message", ids),
        }
    }

    /// Capabilities acknowledged by the server.
    pub fn capability_added(&self) -> &Topic<Capability> {
        &self.capability_added
    }

    /// Capabilities withdrawn by the server (`CAP DEL`).
    pub fn capability_removed(&self) -> &Topic<Capability> {
        &self.capability_removed
    }

    pub fn channel_part(&self) -> &Topic<ChannelPart> {
        &self.channel_part
    }

    pub fn channel_message(&self) -> &Topic<Message> {
        &self.channel_message
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
