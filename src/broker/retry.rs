//! Retry policies
//!
//! A policy decides, after a failed delivery pass, whether the message goes
//! back on its topic queue or to the dead-letter store. The delay it
//! computes is reported in the `retry_scheduled` event; the broker requeues
//! immediately and does not wait it out.

use std::fmt;
use std::time::Duration;

use crate::broker::message::Message;

pub trait RetryPolicy: Send + fmt::Debug {
    /// Must eventually return `false` for a message whose deliveries keep
    /// failing, otherwise a drain pass never finishes.
    fn should_retry(&self, message: &Message) -> bool;

    fn compute_delay(&self, message: &Message) -> Duration;
}

/// Bounded attempts with linear backoff: `max(attempts, 1) * backoff_factor`
/// seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleRetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
}

impl SimpleRetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BACKOFF_FACTOR: f64 = 0.25;

    pub fn new(max_attempts: u32, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            backoff_factor,
        }
    }
}

impl Default for SimpleRetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BACKOFF_FACTOR)
    }
}

impl RetryPolicy for SimpleRetryPolicy {
    fn should_retry(&self, message: &Message) -> bool {
        message.attempts < self.max_attempts
    }

    fn compute_delay(&self, message: &Message) -> Duration {
        let secs = f64::from(message.attempts.max(1)) * self.backoff_factor;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_attempts(attempts: u32) -> Message {
        let mut msg = Message::new(1, "t", json!(null));
        msg.attempts = attempts;
        msg
    }

    #[test]
    fn retries_until_max_attempts() {
        let policy = SimpleRetryPolicy::default();
        assert!(policy.should_retry(&with_attempts(1)));
        assert!(policy.should_retry(&with_attempts(2)));
        assert!(!policy.should_retry(&with_attempts(3)));
        assert!(!policy.should_retry(&with_attempts(4)));
    }

    #[test]
    fn delay_is_linear_in_attempts() {
        let policy = SimpleRetryPolicy::default();
        assert_eq!(policy.compute_delay(&with_attempts(1)), Duration::from_millis(250));
        assert_eq!(policy.compute_delay(&with_attempts(2)), Duration::from_millis(500));
        assert_eq!(policy.compute_delay(&with_attempts(4)), Duration::from_secs(1));
    }

    #[test]
    fn zero_attempts_counts_as_one() {
        let policy = SimpleRetryPolicy::new(5, 2.0);
        assert_eq!(policy.compute_delay(&with_attempts(0)), Duration::from_secs(2));
    }

    #[test]
    fn negative_backoff_yields_zero_delay() {
        let policy = SimpleRetryPolicy::new(3, -1.0);
        assert_eq!(policy.compute_delay(&with_attempts(2)), Duration::ZERO);
    }
}
