//! Message definitions for the broker
//!
//! `Message` is the unit the broker queues and delivers. Once accepted by a
//! topic queue it is owned by the broker and only the delivery logic changes
//! its `status`, `attempts` and receipts; callers see snapshots.
//!
//! Notes on fields:
//! - `id`: monotonically increasing per broker, starting at 1
//! - `payload`: opaque JSON value, never inspected by the broker
//! - `attempts`: number of delivery passes so far; the only input to the
//!   retry policy
//! - `created_at` / `updated_at`: milliseconds since UNIX epoch
//! - `receipts`: one entry per subscriber the message was offered to

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::broker::subscriber::SubscriberId;

pub type MessageId = u64;

/// Lifecycle of a message.
///
/// `Created -> Queued -> Delivering -> Delivered`, or on failure
/// `Failed -> RetryScheduled -> Queued` (repeating) until the retry policy
/// gives up and the message ends in `DeadLetter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Created,
    Queued,
    Delivering,
    Delivered,
    Failed,
    RetryScheduled,
    DeadLetter,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Created => "CREATED",
            MessageStatus::Queued => "QUEUED",
            MessageStatus::Delivering => "DELIVERING",
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Failed => "FAILED",
            MessageStatus::RetryScheduled => "RETRY_SCHEDULED",
            MessageStatus::DeadLetter => "DEAD_LETTER",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::DeadLetter)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery outcome of one message for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub subscriber: SubscriberId,
    pub name: String,
    pub status: MessageStatus,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    pub payload: serde_json::Value,
    pub status: MessageStatus,
    pub attempts: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub receipts: Vec<Receipt>,
}

impl Message {
    pub(crate) fn new(id: MessageId, topic: &str, payload: serde_json::Value) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id,
            topic: topic.to_string(),
            payload,
            status: MessageStatus::Created,
            attempts: 0,
            created_at: now,
            updated_at: now,
            receipts: Vec::new(),
        }
    }

    pub(crate) fn set_status(&mut self, status: MessageStatus) {
        self.status = status;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// The receipt for `subscriber`, if the message was ever offered to it.
    pub fn receipt(&self, subscriber: SubscriberId) -> Option<&Receipt> {
        self.receipts.iter().find(|r| r.subscriber == subscriber)
    }

    pub(crate) fn receipt_mut(&mut self, subscriber: SubscriberId, name: &str) -> &mut Receipt {
        let pos = match self.receipts.iter().position(|r| r.subscriber == subscriber) {
            Some(pos) => pos,
            None => {
                self.receipts.push(Receipt {
                    subscriber,
                    name: name.to_string(),
                    status: MessageStatus::Queued,
                    attempts: 0,
                });
                self.receipts.len() - 1
            }
        };
        &mut self.receipts[pos]
    }
}
