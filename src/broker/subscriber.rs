//! Subscribers and their handlers
//!
//! A handler reports failure by returning `Err(HandlerError)`; the broker
//! turns that into a `failed` event and hands the message to the retry
//! policy. Nothing a handler returns ever reaches the publisher.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::broker::message::Message;

/// Broker-assigned identity of a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

pub type HandlerResult = Result<(), HandlerError>;

pub trait Handler: Send {
    fn handle(&mut self, message: &Message) -> HandlerResult;
}

impl<F> Handler for F
where
    F: FnMut(&Message) -> HandlerResult + Send,
{
    fn handle(&mut self, message: &Message) -> HandlerResult {
        self(message)
    }
}

/// A named handler. The name is only used in events and logs.
pub struct Subscriber {
    name: String,
    handler: Box<dyn Handler>,
}

impl Subscriber {
    pub fn new(name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self {
            name: name.into(),
            handler: Box::new(handler),
        }
    }

    /// Like [`Subscriber::new`], for closures. The explicit `FnMut` bound
    /// lets the closure's argument and return types be inferred.
    pub fn from_fn<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&Message) -> HandlerResult + Send + 'static,
    {
        Self::new(name, handler)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn deliver(&mut self, message: &Message) -> HandlerResult {
        self.handler.handle(message)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
