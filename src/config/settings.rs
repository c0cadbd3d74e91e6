use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::broker::retry::SimpleRetryPolicy;
use crate::broker::strategy::{BatchedDeliveryStrategy, StrategyKind};
use crate::broker::Broker;
use crate::utils::{BrokerError, Result};

/// Top-level configuration settings for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Configuration settings for the broker.
///
/// Bounds the topic queues and parameterizes the retry policy and the
/// delivery strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSettings {
    pub max_queue_size: usize,
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub batch_size: usize,
    pub strategy: StrategyKind,
    pub flush_interval_ms: u64,
}

impl BrokerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(BrokerError::invalid("max_attempts", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(BrokerError::invalid("batch_size", "must be at least 1"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            return Err(BrokerError::invalid(
                "backoff_factor",
                format!("must be a non-negative number, got {}", self.backoff_factor),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(BrokerError::invalid("flush_interval_ms", "must be at least 1"));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_queue_size: Option<usize>,
    pub max_attempts: Option<u32>,
    pub backoff_factor: Option<f64>,
    pub batch_size: Option<usize>,
    pub strategy: Option<StrategyKind>,
    pub flush_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                max_queue_size: Broker::DEFAULT_MAX_QUEUE_SIZE,
                max_attempts: SimpleRetryPolicy::DEFAULT_MAX_ATTEMPTS,
                backoff_factor: SimpleRetryPolicy::DEFAULT_BACKOFF_FACTOR,
                batch_size: BatchedDeliveryStrategy::DEFAULT_BATCH_SIZE,
                strategy: StrategyKind::Immediate,
                flush_interval_ms: 1000,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `Settings::default()`.
    pub fn merge_defaults(self) -> Settings {
        let default = Settings::default();
        let broker = self.broker;
        let log = self.log;

        Settings {
            broker: BrokerSettings {
                max_queue_size: broker
                    .as_ref()
                    .and_then(|b| b.max_queue_size)
                    .unwrap_or(default.broker.max_queue_size),
                max_attempts: broker
                    .as_ref()
                    .and_then(|b| b.max_attempts)
                    .unwrap_or(default.broker.max_attempts),
                backoff_factor: broker
                    .as_ref()
                    .and_then(|b| b.backoff_factor)
                    .unwrap_or(default.broker.backoff_factor),
                batch_size: broker
                    .as_ref()
                    .and_then(|b| b.batch_size)
                    .unwrap_or(default.broker.batch_size),
                strategy: broker
                    .as_ref()
                    .and_then(|b| b.strategy)
                    .unwrap_or(default.broker.strategy),
                flush_interval_ms: broker
                    .as_ref()
                    .and_then(|b| b.flush_interval_ms)
                    .unwrap_or(default.broker.flush_interval_ms),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }
}
