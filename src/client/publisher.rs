use serde_json::Value;

use crate::broker::flusher::{self, SharedBroker};
use crate::broker::message::Message;

/// Publishing handle onto a shared broker.
///
/// Holds no state of its own; every call locks the broker for the duration
/// of the publish, including any deliveries the strategy triggers.
#[derive(Debug, Clone)]
pub struct Publisher {
    broker: SharedBroker,
}

impl Publisher {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }

    pub fn publish(&self, topic: &str, payload: impl Into<Value>) -> Message {
        flusher::lock(&self.broker).publish(topic, payload)
    }

    pub fn broker(&self) -> &SharedBroker {
        &self.broker
    }
}
