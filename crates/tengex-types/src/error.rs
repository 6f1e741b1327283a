//! Error types for the Tengex exchange core.
//!
//! All errors use the `TGX_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order / input errors
//! - 2xx: Balance errors
//! - 3xx: P2P deal / ad errors
//! - 4xx: Access errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AdId, DealId, OrderId};

/// Central error enum for all Tengex operations.
#[derive(Debug, Error)]
pub enum TengexError {
    // =================================================================
    // Order / Input Errors (1xx)
    // =================================================================
    /// The requested order was not found.
    #[error("TGX_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A request failed validation (missing fields, non-positive amounts,
    /// malformed prices, etc.). Checked before any state mutation.
    #[error("TGX_ERR_101: Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// An order with this ID already exists.
    #[error("TGX_ERR_102: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The order is already filled or cancelled.
    #[error("TGX_ERR_103: Order cannot be cancelled in current state")]
    OrderNotCancellable,

    /// The market pair is not registered with the engine.
    #[error("TGX_ERR_104: Unknown market: {symbol}")]
    UnknownMarket { symbol: String },

    /// Too many open orders for this user in this market.
    #[error("TGX_ERR_105: Open order limit exceeded for user")]
    OrderLimitExceeded,

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// Not enough available balance to perform the operation.
    #[error("TGX_ERR_200: Insufficient available balance: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    /// Not enough locked balance to settle from.
    #[error("TGX_ERR_201: Insufficient locked balance: need {needed}, have {locked}")]
    InsufficientLocked { needed: Decimal, locked: Decimal },

    /// A balance operation would produce a negative value.
    #[error("TGX_ERR_202: Balance underflow")]
    BalanceUnderflow,

    // =================================================================
    // P2P Deal / Ad Errors (3xx)
    // =================================================================
    /// The requested deal was not found.
    #[error("TGX_ERR_300: Deal not found: {0}")]
    DealNotFound(DealId),

    /// The requested advertisement was not found.
    #[error("TGX_ERR_301: Ad not found: {0}")]
    AdNotFound(AdId),

    /// The ad cannot serve this deal (inactive, liquidity, limits).
    #[error("TGX_ERR_302: Ad unavailable: {reason}")]
    AdUnavailable { reason: String },

    /// The transition is not legal from the deal's current state.
    #[error("TGX_ERR_303: Invalid deal state: {reason}")]
    InvalidState { reason: String },

    // =================================================================
    // Access Errors (4xx)
    // =================================================================
    /// The acting user is not permitted to perform this operation.
    #[error("TGX_ERR_400: Forbidden: {reason}")]
    Forbidden { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("TGX_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("TGX_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config values, missing fields, etc.).
    #[error("TGX_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Supply conservation audit failed. Critical safety alert.
    #[error("TGX_ERR_903: Conservation violation: {reason}")]
    ConservationViolation { reason: String },
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, TengexError>;

impl TengexError {
    /// Shorthand for the pervasive validation error.
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Shorthand for a state-machine rejection.
    #[must_use]
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Shorthand for an authorization rejection.
    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }
}
