//! Delivery strategies
//!
//! A strategy decides when queued messages are drained. It never touches
//! topic state directly; it drives the broker's [`Dispatcher`], which owns
//! the queues and performs the actual deliveries. Strategies carry no
//! per-topic state, so swapping one for another between publishes is safe.

use serde::{Deserialize, Serialize};

use crate::broker::engine::Dispatcher;
use crate::broker::events::BrokerEvent;
use crate::broker::message::MessageId;

pub trait DeliveryStrategy: Send {
    fn name(&self) -> &'static str;

    /// Called once per publish with a message in `CREATED` state.
    fn publish(&mut self, dispatcher: &mut Dispatcher, topic: &str, message: MessageId);

    fn flush(&mut self, dispatcher: &mut Dispatcher, topic: &str);
}

/// Enqueue and drain the whole topic queue on every publish.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateDeliveryStrategy;

impl DeliveryStrategy for ImmediateDeliveryStrategy {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn publish(&mut self, dispatcher: &mut Dispatcher, topic: &str, message: MessageId) {
        dispatcher.enqueue(topic, message);
        dispatcher.deliver_topic(topic);
    }

    fn flush(&mut self, _dispatcher: &mut Dispatcher, _topic: &str) {}
}

/// Enqueue only, draining once the queue holds `batch_size` messages.
#[derive(Debug, Clone, Copy)]
pub struct BatchedDeliveryStrategy {
    pub batch_size: usize,
}

impl BatchedDeliveryStrategy {
    pub const DEFAULT_BATCH_SIZE: usize = 3;

    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

impl Default for BatchedDeliveryStrategy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BATCH_SIZE)
    }
}

impl DeliveryStrategy for BatchedDeliveryStrategy {
    fn name(&self) -> &'static str {
        "batched"
    }

    fn publish(&mut self, dispatcher: &mut Dispatcher, topic: &str, message: MessageId) {
        dispatcher.enqueue(topic, message);
        if dispatcher.queue_len(topic) >= self.batch_size {
            dispatcher.deliver_topic(topic);
        }
    }

    fn flush(&mut self, dispatcher: &mut Dispatcher, topic: &str) {
        let size = dispatcher.queue_len(topic);
        if size == 0 {
            return;
        }
        tracing::info!(topic, size, "flushing batch");
        dispatcher.emit(BrokerEvent::BatchFlush {
            topic: topic.to_string(),
            size,
        });
        dispatcher.deliver_topic(topic);
    }
}

/// Strategy selector used by configuration and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Immediate,
    Batched,
}

impl StrategyKind {
    pub fn build(self, batch_size: usize) -> Box<dyn DeliveryStrategy> {
        match self {
            StrategyKind::Immediate => Box::new(ImmediateDeliveryStrategy),
            StrategyKind::Batched => Box::new(BatchedDeliveryStrategy::new(batch_size)),
        }
    }
}
