//! The `error` module defines the error types used within `dlqsub`.
//!
//! Broker operations themselves never fail: publish-time rejection and
//! delivery failure are reported through lifecycle events and message
//! status. `BrokerError` covers what can go wrong before a broker exists,
//! namely loading and validating configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

impl BrokerError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_setting_names_the_field() {
        let err = BrokerError::invalid("batch_size", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid setting `batch_size`: must be at least 1"
        );
    }

    #[test]
    fn config_errors_convert() {
        let err: BrokerError = config::ConfigError::Message("boom".to_string()).into();
        assert!(matches!(err, BrokerError::Config(_)));
        assert!(err.to_string().contains("boom"));
    }
}
