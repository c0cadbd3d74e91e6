//! Lifecycle events
//!
//! Every state change in the broker is reported as a [`BrokerEvent`] to each
//! registered [`EventListener`], synchronously and in registration order,
//! before the triggering call returns.
//!
//! Listeners run inside broker operations. A listener that panics unwinds
//! through the broker; keeping listeners infallible is the caller's job.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};

use crate::broker::message::MessageId;

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    SubscriberAdded {
        topic: String,
        subscriber: String,
    },
    MessageEnqueued {
        topic: String,
        id: MessageId,
        queue_length: usize,
    },
    Backpressure {
        topic: String,
        queue_length: usize,
    },
    Delivering {
        topic: String,
        id: MessageId,
        attempt: u32,
        subscriber: String,
    },
    /// `subscriber` is `None` when the topic had nobody to deliver to.
    Delivered {
        topic: String,
        id: MessageId,
        subscriber: Option<String>,
    },
    Failed {
        topic: String,
        id: MessageId,
        subscriber: String,
        error: String,
    },
    RetryScheduled {
        topic: String,
        id: MessageId,
        delay: Duration,
    },
    DeadLetter {
        topic: String,
        id: MessageId,
    },
    StrategySwapped {
        old: String,
        new: String,
    },
    BatchFlush {
        topic: String,
        size: usize,
    },
}

impl BrokerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BrokerEvent::SubscriberAdded { .. } => "subscriber_added",
            BrokerEvent::MessageEnqueued { .. } => "message_enqueued",
            BrokerEvent::Backpressure { .. } => "backpressure",
            BrokerEvent::Delivering { .. } => "delivering",
            BrokerEvent::Delivered { .. } => "delivered",
            BrokerEvent::Failed { .. } => "failed",
            BrokerEvent::RetryScheduled { .. } => "retry_scheduled",
            BrokerEvent::DeadLetter { .. } => "dead_letter",
            BrokerEvent::StrategySwapped { .. } => "strategy_swapped",
            BrokerEvent::BatchFlush { .. } => "batch_flush",
        }
    }

    pub fn topic(&self) -> Option<&str> {
        match self {
            BrokerEvent::SubscriberAdded { topic, .. }
            | BrokerEvent::MessageEnqueued { topic, .. }
            | BrokerEvent::Backpressure { topic, .. }
            | BrokerEvent::Delivering { topic, .. }
            | BrokerEvent::Delivered { topic, .. }
            | BrokerEvent::Failed { topic, .. }
            | BrokerEvent::RetryScheduled { topic, .. }
            | BrokerEvent::DeadLetter { topic, .. }
            | BrokerEvent::BatchFlush { topic, .. } => Some(topic),
            BrokerEvent::StrategySwapped { .. } => None,
        }
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            BrokerEvent::MessageEnqueued { id, .. }
            | BrokerEvent::Delivering { id, .. }
            | BrokerEvent::Delivered { id, .. }
            | BrokerEvent::Failed { id, .. }
            | BrokerEvent::RetryScheduled { id, .. }
            | BrokerEvent::DeadLetter { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// The event's payload as a JSON object. Delays are in seconds.
    pub fn payload(&self) -> Value {
        match self {
            BrokerEvent::SubscriberAdded { topic, subscriber } => {
                json!({ "topic": topic, "subscriber": subscriber })
            }
            BrokerEvent::MessageEnqueued {
                topic,
                id,
                queue_length,
            } => json!({ "topic": topic, "id": id, "queue_length": queue_length }),
            BrokerEvent::Backpressure {
                topic,
                queue_length,
            } => json!({ "topic": topic, "queue_length": queue_length }),
            BrokerEvent::Delivering {
                topic,
                id,
                attempt,
                subscriber,
            } => json!({
                "topic": topic,
                "id": id,
                "attempt": attempt,
                "subscriber": subscriber,
            }),
            BrokerEvent::Delivered {
                topic,
                id,
                subscriber: Some(subscriber),
            } => json!({ "topic": topic, "id": id, "subscriber": subscriber }),
            BrokerEvent::Delivered {
                topic,
                id,
                subscriber: None,
            } => json!({ "topic": topic, "id": id, "subs": 0 }),
            BrokerEvent::Failed {
                topic,
                id,
                subscriber,
                error,
            } => json!({
                "topic": topic,
                "id": id,
                "subscriber": subscriber,
                "error": error,
            }),
            BrokerEvent::RetryScheduled { topic, id, delay } => {
                json!({ "topic": topic, "id": id, "delay": delay.as_secs_f64() })
            }
            BrokerEvent::DeadLetter { topic, id } => json!({ "topic": topic, "id": id }),
            BrokerEvent::StrategySwapped { old, new } => json!({ "old": old, "new": new }),
            BrokerEvent::BatchFlush { topic, size } => json!({ "topic": topic, "size": size }),
        }
    }
}

pub trait EventListener: Send {
    fn on_event(&mut self, event: &BrokerEvent);
}

impl<F> EventListener for F
where
    F: FnMut(&BrokerEvent) + Send,
{
    fn on_event(&mut self, event: &BrokerEvent) {
        self(event)
    }
}

/// Listener that keeps every event it sees. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<BrokerEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(BrokerEvent::name)
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventListener for EventRecorder {
    fn on_event(&mut self, event: &BrokerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
