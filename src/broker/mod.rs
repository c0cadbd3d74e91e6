pub mod dead_letter;
pub mod engine;
pub mod events;
pub mod flusher;
pub mod message;
pub mod retry;
pub mod strategy;
pub mod subscriber;
pub mod topic;

pub use dead_letter::{DeadLetter, DeadLetterStore};
pub use engine::{Broker, Dispatcher, TopicSummary};
pub use events::{BrokerEvent, EventListener, EventRecorder};
pub use flusher::{SharedBroker, run_flush_loop};
pub use message::{Message, MessageId, MessageStatus, Receipt};
pub use retry::{RetryPolicy, SimpleRetryPolicy};
pub use strategy::{
    BatchedDeliveryStrategy, DeliveryStrategy, ImmediateDeliveryStrategy, StrategyKind,
};
pub use subscriber::{Handler, HandlerError, HandlerResult, Subscriber, SubscriberId};
pub use topic::{Topic, TopicMetrics};
