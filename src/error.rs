//! Error kinds surfaced by the trading core
//!
//! A drawdown breach is deliberately absent: it is a designed terminal
//! transition (`CycleOutcome::Liquidated`), not a failure.

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::PositionState;
use crate::oms::{LedgerError, OrderId};

#[derive(Debug, Error)]
pub enum TradingError {
    /// Broker session unavailable. Fatal to the current run.
    #[error("broker connection failure: {0}")]
    ConnectionFailure(String),

    /// Empty or insufficient price history. The runner sleeps and retries.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// The venue refused a submission.
    #[error("order {order} rejected: {reason}")]
    OrderRejected { order: OrderId, reason: String },

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error(
        "worst-case exposure {exposure:.2} {currency} exceeds {limit:.2} (90% of available funds)"
    )]
    InsufficientCapital {
        exposure: f64,
        limit: f64,
        currency: String,
    },

    #[error("pair {pair} does not contain home currency {home}")]
    ForeignPair { pair: String, home: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("invalid transition from {from:?} on {event}")]
    InvalidTransition {
        from: PositionState,
        event: &'static str,
    },
}

impl TradingError {
    /// Whether the runner may sleep and try again instead of stopping
    pub fn is_retryable(&self) -> bool {
        matches!(self, TradingError::DataUnavailable(_))
    }
}

pub type TradingResult<T> = Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_data_errors_are_retryable() {
        assert!(TradingError::DataUnavailable("empty".into()).is_retryable());
        assert!(!TradingError::ConnectionFailure("down".into()).is_retryable());
        assert!(!TradingError::OrderRejected {
            order: OrderId(1),
            reason: "margin".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_rejection_message_names_order() {
        let err = TradingError::OrderRejected {
            order: OrderId(7),
            reason: "price out of band".into(),
        };
        assert_eq!(err.to_string(), "order #7 rejected: price out of band");
    }
}
