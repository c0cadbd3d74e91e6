//! Dead-letter store
//!
//! Append-only record of messages whose retries were exhausted. Entries are
//! kept for the lifetime of the broker. Messages dropped by backpressure
//! never land here.

use serde::Serialize;

use crate::broker::message::{Message, MessageId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    /// Snapshot taken when the message was dead-lettered.
    pub message: Message,
    /// Subscribers that never acknowledged the message, by name.
    pub failed_subscribers: Vec<String>,
    pub last_error: Option<String>,
    pub dead_lettered_at: i64,
}

#[derive(Debug, Default)]
pub struct DeadLetterStore {
    entries: Vec<DeadLetter>,
}

impl DeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: DeadLetter) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeadLetter> {
        self.entries.iter()
    }

    pub fn for_topic<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a DeadLetter> {
        self.entries.iter().filter(move |e| e.message.topic == topic)
    }

    pub fn get(&self, id: MessageId) -> Option<&DeadLetter> {
        self.entries.iter().find(|e| e.message.id == id)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.get(id).is_some()
    }
}
