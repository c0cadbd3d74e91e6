//! Topic management
//!
//! A `Topic` owns its FIFO queue of pending deliveries, its subscribers in
//! registration order and its metrics. Topics are created implicitly on the
//! first subscribe or publish and are never removed.
//!
//! Concurrency note: callers must synchronize access to `Topic` (for example
//! via the broker lock).

use std::collections::VecDeque;

use serde::Serialize;

use crate::broker::message::MessageId;
use crate::broker::subscriber::{Subscriber, SubscriberId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopicMetrics {
    /// Publish attempts, including those rejected by backpressure.
    pub published: u64,
    /// Messages that reached `DELIVERED`.
    pub delivered: u64,
    /// Failed handler invocations.
    pub failed: u64,
    pub dead_letter: u64,
}

/// A pending delivery pass for one message.
///
/// `targets` is `None` for a fresh message (offer it to every current
/// subscriber) and lists the subscribers still owed a delivery on retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueueEntry {
    pub message: MessageId,
    pub targets: Option<Vec<SubscriberId>>,
}

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub metrics: TopicMetrics,
    pub(crate) queue: VecDeque<QueueEntry>,
    pub(crate) subscribers: Vec<(SubscriberId, Subscriber)>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn subscribe(&mut self, id: SubscriberId, subscriber: Subscriber) {
        self.subscribers.push((id, subscriber));
    }

    /// Remove a subscriber. Returns `false` if it was not registered here.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.subscribers.iter().map(|(id, _)| *id).collect()
    }

    /// Ids of queued messages, front first.
    pub fn queued_ids(&self) -> Vec<MessageId> {
        self.queue.iter().map(|e| e.message).collect()
    }

    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.iter().any(|(sid, _)| *sid == id)
    }

    pub(crate) fn subscriber_mut(&mut self, id: SubscriberId) -> Option<&mut Subscriber> {
        self.subscribers
            .iter_mut()
            .find(|(sid, _)| *sid == id)
            .map(|(_, s)| s)
    }
}
