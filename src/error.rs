//! Error taxonomy for the trading core.
//!
//! Every per-tick failure is recoverable: the scheduling loop logs it and
//! retries after a backoff. Only [`TradeError::ConfigInvalid`] is fatal, and
//! only at startup.

use thiserror::Error;

/// Errors raised while advancing the position lifecycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    /// Market data (price, candles, lot step, position) could not be fetched.
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    /// The venue refused or failed to execute an order.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Too few candles to compute a signal.
    #[error("insufficient data: need {required} candles, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Malformed staking ladder, percentages or thresholds.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A port call exceeded the configured request timeout.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// Durable storage (ledger, loss store, event log) failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl TradeError {
    /// Whether the loop can simply retry on the next tick.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TradeError::ConfigInvalid(_))
    }
}

impl From<rusqlite::Error> for TradeError {
    fn from(err: rusqlite::Error) -> Self {
        TradeError::Storage(err.to_string())
    }
}

pub type TradeResult<T> = std::result::Result<T, TradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(TradeError::DataUnavailable("ticker".into()).is_transient());
        assert!(TradeError::OrderRejected("margin".into()).is_transient());
        assert!(TradeError::Timeout {
            operation: "current_price",
            secs: 10
        }
        .is_transient());
        assert!(!TradeError::ConfigInvalid("empty ladder".into()).is_transient());
    }

    #[test]
    fn test_insufficient_data_message() {
        let err = TradeError::InsufficientData {
            required: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "insufficient data: need 2 candles, got 1");
    }
}
