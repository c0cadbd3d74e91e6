//! # dlqsub
//!
//! `dlqsub` is an in-process publish/subscribe broker with at-least-once
//! delivery: failed deliveries are retried under a pluggable retry policy
//! and messages that exhaust their retries are kept in a dead-letter store.
//! Topic queues are bounded; a publish onto a full queue is dropped and
//! reported as backpressure.
//!
//! ## Core Modules
//!
//! - `broker`: topics, queues, delivery strategies, retry policies, the
//!   dead-letter store and lifecycle events.
//! - `client`: the `Publisher` facade over a shared broker.
//! - `config`: loading and validating settings.
//! - `utils`: error type and logging setup.
//!
//! ## Example
//!
//! ```rust
//! use dlqsub::broker::{Broker, EventRecorder, HandlerError, MessageStatus, Subscriber};
//!
//! let mut broker = Broker::new();
//! let events = EventRecorder::new();
//! broker.add_listener(events.clone());
//!
//! let mut calls = 0;
//! broker.add_subscriber(
//!     "orders",
//!     Subscriber::from_fn("billing", move |_| {
//!         calls += 1;
//!         if calls < 3 { Err(HandlerError::new("billing offline")) } else { Ok(()) }
//!     }),
//! );
//!
//! let msg = broker.publish("orders", "order-1");
//! assert_eq!(msg.status, MessageStatus::Delivered);
//! assert_eq!(msg.attempts, 3);
//! assert_eq!(events.count("failed"), 2);
//! ```

pub mod broker;
pub mod client;
pub mod config;
pub mod utils;
