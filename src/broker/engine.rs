//! Broker engine
//!
//! This module contains the in-memory broker responsible for:
//! - managing topics, their FIFO queues and subscriber lists
//! - delivering queued messages to every subscriber of a topic
//! - retrying failed deliveries through a pluggable `RetryPolicy`
//! - moving messages that exhaust their retries to the `DeadLetterStore`
//! - rejecting publishes when a topic queue is full (backpressure)
//!
//! The broker is split in two. [`Broker`] is the public entry point and
//! owns the active [`DeliveryStrategy`]. [`Dispatcher`] owns every piece of
//! mutable state and is what strategies drive when deciding to enqueue or
//! drain.
//!
//! Concurrency and usage notes:
//! - Everything here is synchronous. Events are emitted and handlers run on
//!   the caller's stack before the call returns.
//! - To share a broker across tasks, wrap it in `Arc<Mutex<Broker>>` (see
//!   `broker::flusher`). Handlers and listeners run while that lock is held.
//! - Delivery is tracked per (message, subscriber): a retry pass only
//!   redelivers to subscribers whose previous attempt failed.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::broker::dead_letter::{DeadLetter, DeadLetterStore};
use crate::broker::events::{BrokerEvent, EventListener};
use crate::broker::message::{Message, MessageId, MessageStatus};
use crate::broker::retry::{RetryPolicy, SimpleRetryPolicy};
use crate::broker::strategy::{DeliveryStrategy, ImmediateDeliveryStrategy};
use crate::broker::subscriber::{Subscriber, SubscriberId};
use crate::broker::topic::{QueueEntry, Topic, TopicMetrics};
use crate::config::BrokerSettings;
use crate::utils::Result;

/// Per-topic snapshot returned by [`Broker::summarize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopicSummary {
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dead_letter: u64,
    pub queue_length: usize,
    pub subscribers: usize,
}

/// Mutable broker state: topics, the message table, dead letters, the retry
/// policy and the event listeners.
pub struct Dispatcher {
    topics: BTreeMap<String, Topic>,
    messages: HashMap<MessageId, Message>,
    dead_letters: DeadLetterStore,
    retry_policy: Box<dyn RetryPolicy>,
    listeners: Vec<Box<dyn EventListener>>,
    max_queue_size: usize,
}

impl Dispatcher {
    fn new(max_queue_size: usize) -> Self {
        Self {
            topics: BTreeMap::new(),
            messages: HashMap::new(),
            dead_letters: DeadLetterStore::new(),
            retry_policy: Box::new(SimpleRetryPolicy::default()),
            listeners: Vec::new(),
            max_queue_size,
        }
    }

    fn topic_mut(&mut self, name: &str) -> &mut Topic {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| Topic::new(name))
    }

    /// Send `event` to every listener, in registration order.
    pub fn emit(&mut self, event: BrokerEvent) {
        emit(&mut self.listeners, event);
    }

    pub fn queue_len(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Topic::queue_len)
    }

    /// Append a freshly published message to its topic queue.
    ///
    /// When the queue already holds `max_queue_size` entries the message is
    /// dropped: it is forgotten by the broker, a `backpressure` event is
    /// emitted, and `false` is returned. Dropped messages are neither
    /// retried nor dead-lettered.
    pub fn enqueue(&mut self, topic: &str, id: MessageId) -> bool {
        let max_queue_size = self.max_queue_size;
        let Dispatcher {
            topics,
            messages,
            listeners,
            ..
        } = self;
        let topic_ref = topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic));

        let queue_length = topic_ref.queue.len();
        if queue_length >= max_queue_size {
            messages.remove(&id);
            warn!(topic, id, queue_length, "queue full, dropping message");
            emit(
                listeners,
                BrokerEvent::Backpressure {
                    topic: topic.to_string(),
                    queue_length,
                },
            );
            return false;
        }

        let Some(message) = messages.get_mut(&id) else {
            warn!(topic, id, "enqueue of unknown message ignored");
            return false;
        };
        message.set_status(MessageStatus::Queued);
        topic_ref.queue.push_back(QueueEntry {
            message: id,
            targets: None,
        });
        let queue_length = topic_ref.queue.len();
        debug!(topic, id, queue_length, "message enqueued");
        emit(
            listeners,
            BrokerEvent::MessageEnqueued {
                topic: topic.to_string(),
                id,
                queue_length,
            },
        );
        true
    }

    /// Drain the topic queue front to back until it is empty.
    ///
    /// Each queued message is offered to all of its target subscribers
    /// before the next one is taken. Retries go to the back of the queue and
    /// are drained in the same call.
    pub fn deliver_topic(&mut self, topic: &str) {
        loop {
            let entry = match self.topics.get_mut(topic) {
                Some(t) => t.queue.pop_front(),
                None => None,
            };
            let Some(entry) = entry else { break };
            self.deliver_entry(topic, entry);
        }
    }

    /// One delivery pass of one message.
    fn deliver_entry(&mut self, topic: &str, entry: QueueEntry) {
        let Dispatcher {
            topics,
            messages,
            dead_letters,
            retry_policy,
            listeners,
            ..
        } = self;
        let Some(topic_ref) = topics.get_mut(topic) else {
            return;
        };
        let Some(message) = messages.get_mut(&entry.message) else {
            warn!(topic, id = entry.message, "queued message missing from table");
            return;
        };

        // Subscribers removed since the entry was queued are skipped.
        let is_retry = entry.targets.is_some();
        let targets: Vec<SubscriberId> = match entry.targets {
            Some(ids) => ids
                .into_iter()
                .filter(|id| topic_ref.has_subscriber(*id))
                .collect(),
            None => topic_ref.subscriber_ids(),
        };

        if is_retry && targets.is_empty() {
            // every subscriber still owed this message is gone; no handler
            // runs, so the pass is not an attempt
            message.set_status(MessageStatus::Delivered);
            topic_ref.metrics.delivered += 1;
            debug!(topic, id = message.id, "retry targets removed, message settled");
            return;
        }

        message.attempts += 1;
        let attempt = message.attempts;

        if targets.is_empty() {
            message.set_status(MessageStatus::Delivered);
            topic_ref.metrics.delivered += 1;
            debug!(topic, id = message.id, "no subscribers, message settled");
            emit(
                listeners,
                BrokerEvent::Delivered {
                    topic: topic.to_string(),
                    id: message.id,
                    subscriber: None,
                },
            );
            return;
        }

        let mut failed = Vec::new();
        let mut last_error = None;
        for sub_id in targets {
            let Some(subscriber) = topic_ref.subscriber_mut(sub_id) else {
                continue;
            };
            let name = subscriber.name().to_string();

            message.set_status(MessageStatus::Delivering);
            let receipt = message.receipt_mut(sub_id, &name);
            receipt.status = MessageStatus::Delivering;
            receipt.attempts += 1;
            emit(
                listeners,
                BrokerEvent::Delivering {
                    topic: topic.to_string(),
                    id: message.id,
                    attempt,
                    subscriber: name.clone(),
                },
            );

            match subscriber.deliver(message) {
                Ok(()) => {
                    message.receipt_mut(sub_id, &name).status = MessageStatus::Delivered;
                    debug!(topic, id = message.id, subscriber = %name, attempt, "delivered");
                    emit(
                        listeners,
                        BrokerEvent::Delivered {
                            topic: topic.to_string(),
                            id: message.id,
                            subscriber: Some(name),
                        },
                    );
                }
                Err(err) => {
                    message.receipt_mut(sub_id, &name).status = MessageStatus::Failed;
                    message.set_status(MessageStatus::Failed);
                    topic_ref.metrics.failed += 1;
                    warn!(topic, id = message.id, subscriber = %name, attempt, error = %err, "delivery failed");
                    emit(
                        listeners,
                        BrokerEvent::Failed {
                            topic: topic.to_string(),
                            id: message.id,
                            subscriber: name.clone(),
                            error: err.to_string(),
                        },
                    );
                    failed.push((sub_id, name));
                    last_error = Some(err.to_string());
                }
            }
        }

        if failed.is_empty() {
            message.set_status(MessageStatus::Delivered);
            topic_ref.metrics.delivered += 1;
            return;
        }

        message.set_status(MessageStatus::Failed);
        if retry_policy.should_retry(message) {
            message.set_status(MessageStatus::RetryScheduled);
            let delay = retry_policy.compute_delay(message);
            warn!(topic, id = message.id, attempt, ?delay, "retry scheduled");
            emit(
                listeners,
                BrokerEvent::RetryScheduled {
                    topic: topic.to_string(),
                    id: message.id,
                    delay,
                },
            );
            message.set_status(MessageStatus::Queued);
            topic_ref.queue.push_back(QueueEntry {
                message: message.id,
                targets: Some(failed.into_iter().map(|(id, _)| id).collect()),
            });
        } else {
            message.set_status(MessageStatus::DeadLetter);
            for (sub_id, name) in &failed {
                message.receipt_mut(*sub_id, name).status = MessageStatus::DeadLetter;
            }
            topic_ref.metrics.dead_letter += 1;
            error!(topic, id = message.id, attempts = attempt, "retries exhausted, dead-lettering");
            dead_letters.push(DeadLetter {
                message: message.clone(),
                failed_subscribers: failed.into_iter().map(|(_, name)| name).collect(),
                last_error,
                dead_lettered_at: chrono::Utc::now().timestamp_millis(),
            });
            emit(
                listeners,
                BrokerEvent::DeadLetter {
                    topic: topic.to_string(),
                    id: message.id,
                },
            );
        }
    }
}

fn emit(listeners: &mut [Box<dyn EventListener>], event: BrokerEvent) {
    for listener in listeners.iter_mut() {
        listener.on_event(&event);
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("topics", &self.topics.keys().collect::<Vec<_>>())
            .field("messages", &self.messages.len())
            .field("dead_letters", &self.dead_letters.len())
            .field("retry_policy", &self.retry_policy)
            .field("listeners", &self.listeners.len())
            .field("max_queue_size", &self.max_queue_size)
            .finish()
    }
}

/// The pub/sub broker.
///
/// Construct one per process (or per test) and share it explicitly; there
/// is no global instance.
pub struct Broker {
    dispatcher: Dispatcher,
    strategy: Box<dyn DeliveryStrategy>,
    next_message_id: MessageId,
    next_subscriber_id: u64,
}

impl Broker {
    pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10;

    /// Broker with a queue bound of 10, `SimpleRetryPolicy::default()` and
    /// immediate delivery.
    pub fn new() -> Self {
        Self {
            dispatcher: Dispatcher::new(Self::DEFAULT_MAX_QUEUE_SIZE),
            strategy: Box::new(ImmediateDeliveryStrategy),
            next_message_id: 0,
            next_subscriber_id: 0,
        }
    }

    /// Build a broker from validated settings.
    pub fn from_settings(settings: &BrokerSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::new()
            .with_max_queue_size(settings.max_queue_size)
            .with_retry_policy(SimpleRetryPolicy::new(
                settings.max_attempts,
                settings.backoff_factor,
            ))
            .with_strategy(settings.strategy.build(settings.batch_size)))
    }

    /// Bound every topic queue to `max_queue_size` pending messages.
    ///
    /// A publish that finds its queue at the bound is dropped and reported
    /// with a `backpressure` event. Zero rejects every publish.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.dispatcher.max_queue_size = max_queue_size;
        self
    }

    /// Replace the retry policy consulted after every failed delivery pass.
    ///
    /// The policy must eventually refuse a message that keeps failing,
    /// since retries are drained in the same pass that requeued them.
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.dispatcher.retry_policy = Box::new(policy);
        self
    }

    /// Set the initial strategy. Unlike [`Broker::swap_strategy`] this emits
    /// no event.
    pub fn with_strategy(mut self, strategy: Box<dyn DeliveryStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Register a listener for lifecycle events.
    ///
    /// Listeners are called synchronously in registration order, from inside
    /// the broker operation that triggered the event. A panicking listener
    /// unwinds through that operation.
    pub fn add_listener(&mut self, listener: impl EventListener + 'static) {
        self.dispatcher.listeners.push(Box::new(listener));
    }

    /// The per-topic queue bound.
    pub fn max_queue_size(&self) -> usize {
        self.dispatcher.max_queue_size
    }

    /// Name of the active delivery strategy, e.g. `"immediate"`.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Register `subscriber` on `topic`, creating the topic if needed.
    pub fn add_subscriber(&mut self, topic: &str, subscriber: Subscriber) -> SubscriberId {
        self.next_subscriber_id += 1;
        let id = SubscriberId(self.next_subscriber_id);
        let name = subscriber.name().to_string();

        self.dispatcher.topic_mut(topic).subscribe(id, subscriber);
        debug!(topic, subscriber = %name, %id, "subscriber added");
        self.dispatcher.emit(BrokerEvent::SubscriberAdded {
            topic: topic.to_string(),
            subscriber: name,
        });
        id
    }

    /// Unregister a subscriber. Queued retries stop targeting it.
    pub fn remove_subscriber(&mut self, topic: &str, id: SubscriberId) -> bool {
        let removed = self
            .dispatcher
            .topics
            .get_mut(topic)
            .is_some_and(|t| t.unsubscribe(id));
        if removed {
            debug!(topic, %id, "subscriber removed");
        }
        removed
    }

    /// Publish `payload` on `topic`.
    ///
    /// The returned message is a snapshot taken after the active strategy
    /// ran, so with immediate delivery it already shows the final outcome.
    /// A message rejected by backpressure comes back in `CREATED` state and
    /// is not retained.
    pub fn publish(&mut self, topic: &str, payload: impl Into<serde_json::Value>) -> Message {
        self.next_message_id += 1;
        let id = self.next_message_id;
        let message = Message::new(id, topic, payload.into());

        self.dispatcher.topic_mut(topic).metrics.published += 1;
        self.dispatcher.messages.insert(id, message.clone());
        debug!(topic, id, strategy = self.strategy.name(), "publishing");

        self.strategy.publish(&mut self.dispatcher, topic, id);

        self.dispatcher.messages.get(&id).cloned().unwrap_or(message)
    }

    /// Replace the delivery strategy, returning the previous one.
    ///
    /// Queued messages stay where they are; the new strategy decides when
    /// they are drained.
    pub fn swap_strategy(&mut self, strategy: Box<dyn DeliveryStrategy>) -> Box<dyn DeliveryStrategy> {
        let old = std::mem::replace(&mut self.strategy, strategy);
        info!(old = old.name(), new = self.strategy.name(), "delivery strategy swapped");
        self.dispatcher.emit(BrokerEvent::StrategySwapped {
            old: old.name().to_string(),
            new: self.strategy.name().to_string(),
        });
        old
    }

    /// Ask the active strategy to deliver whatever is queued on `topic`.
    ///
    /// This is a no-op for immediate delivery, which never leaves anything
    /// queued. Batched delivery drains the queue regardless of batch size.
    pub fn flush(&mut self, topic: &str) {
        self.strategy.flush(&mut self.dispatcher, topic);
    }

    /// Flush every known topic, in name order.
    pub fn flush_all(&mut self) {
        let topics: Vec<String> = self.dispatcher.topics.keys().cloned().collect();
        for topic in topics {
            self.strategy.flush(&mut self.dispatcher, &topic);
        }
    }

    /// Per-topic counters plus the live queue length and subscriber count.
    ///
    /// `published` counts publish attempts, including those rejected by
    /// backpressure, so once a topic has drained
    /// `published == delivered + dead_letter + dropped`.
    pub fn summarize(&self) -> BTreeMap<String, TopicSummary> {
        self.dispatcher
            .topics
            .iter()
            .map(|(name, topic)| {
                let TopicMetrics {
                    published,
                    delivered,
                    failed,
                    dead_letter,
                } = topic.metrics;
                let summary = TopicSummary {
                    published,
                    delivered,
                    failed,
                    dead_letter,
                    queue_length: topic.queue_len(),
                    subscribers: topic.subscriber_count(),
                };
                (name.clone(), summary)
            })
            .collect()
    }

    /// Look up a topic. Topics exist once they were published or subscribed to.
    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.dispatcher.topics.get(name)
    }

    /// Current state of a message accepted by a topic queue.
    ///
    /// Settled messages are only found here until the next
    /// [`Broker::prune_settled`]; after that a dead-lettered message is still
    /// served from the dead-letter store.
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.dispatcher.messages.get(&id).or_else(|| {
            self.dispatcher
                .dead_letters
                .get(id)
                .map(|entry| &entry.message)
        })
    }

    /// Messages whose retries were exhausted, oldest first.
    pub fn dead_letters(&self) -> &DeadLetterStore {
        &self.dispatcher.dead_letters
    }

    /// Forget messages that reached `DELIVERED` or `DEAD_LETTER`. Returns
    /// how many were dropped.
    ///
    /// Dead letters stay available through [`Broker::dead_letters`]. The
    /// background flush loop calls this after every flush, so a shared
    /// broker only retains messages that are still in flight.
    pub fn prune_settled(&mut self) -> usize {
        let before = self.dispatcher.messages.len();
        self.dispatcher
            .messages
            .retain(|_, m| !m.status.is_terminal());
        let pruned = before - self.dispatcher.messages.len();
        if pruned > 0 {
            debug!(pruned, "settled messages pruned");
        }
        pruned
    }

    /// Number of messages currently held in the message table.
    pub fn retained_messages(&self) -> usize {
        self.dispatcher.messages.len()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("strategy", &self.strategy.name())
            .field("dispatcher", &self.dispatcher)
            .field("next_message_id", &self.next_message_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::events::EventRecorder;
    use crate::broker::strategy::BatchedDeliveryStrategy;
    use crate::broker::subscriber::HandlerError;

    #[test]
    fn test_retry_with_all_targets_removed_settles_quietly() {
        let recorder = EventRecorder::new();
        let mut broker = Broker::new().with_strategy(Box::new(BatchedDeliveryStrategy::new(5)));
        broker.add_listener(recorder.clone());
        broker.add_subscriber("t", Subscriber::from_fn("audit", |_| Ok(())));
        let billing = broker.add_subscriber(
            "t",
            Subscriber::from_fn("billing", |_| Err(HandlerError::new("down"))),
        );
        let msg = broker.publish("t", "x");

        // leave a pending retry owed only to billing, then drop billing
        let topic = broker.dispatcher.topic_mut("t");
        topic.queue.clear();
        topic.queue.push_back(QueueEntry {
            message: msg.id,
            targets: Some(vec![billing]),
        });
        assert!(broker.remove_subscriber("t", billing));
        recorder.clear();

        broker.flush("t");

        assert_eq!(recorder.names(), vec!["batch_flush"]);
        let settled = broker.message(msg.id).expect("retained until pruned");
        assert_eq!(settled.status, MessageStatus::Delivered);
        assert_eq!(settled.attempts, 0);
        assert_eq!(broker.summarize()["t"].delivered, 1);
        assert_eq!(broker.summarize()["t"].subscribers, 1);
    }
}
