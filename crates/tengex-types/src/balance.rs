//! Balance tracking types for the Tengex ledger.
//!
//! Every user has an `available` balance (usable for new orders and deals)
//! and a `locked` balance (reserved by resting orders and open escrow deals).
//! Neither component is ever negative.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single balance entry for a (user, currency) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceEntry {
    /// Available for new orders, deals, or withdrawal.
    pub available: Decimal,
    /// Locked by resting order reservations and open escrow deals.
    pub locked: Decimal,
}

impl BalanceEntry {
    /// Create a zero balance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
        }
    }

    /// Total balance (available + locked).
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }

    /// Whether this entry has no balance at all.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.locked.is_zero()
    }
}

impl Default for BalanceEntry {
    fn default() -> Self {
        Self::new()
    }
}

/// Type alias for currency identifiers (e.g., "BTC", "USDT", "KZT").
pub type Asset = String;
