//! P2P advertisement types.
//!
//! An ad is a standing offer to trade crypto for fiat at a fixed price.
//! Posting an ad moves no funds; liquidity is only reserved when a deal is
//! opened against it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AdId, Asset, UserId};

/// Which direction the ad's owner trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdSide {
    /// Owner sells crypto for fiat. Only this side can serve escrow deals.
    Sell,
    /// Owner buys crypto for fiat.
    Buy,
}

impl std::fmt::Display for AdSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sell => write!(f, "SELL"),
            Self::Buy => write!(f, "BUY"),
        }
    }
}

/// A P2P advertisement row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ad {
    pub id: AdId,
    pub user_id: UserId,
    pub side: AdSide,
    /// The crypto currency offered.
    pub currency: Asset,
    /// Fiat price per unit of `currency`.
    pub price: Decimal,
    /// Remaining crypto liquidity. Decremented when a deal opens,
    /// restored when one cancels.
    pub available: Decimal,
    /// Minimum deal size, in fiat.
    pub limit_min: Decimal,
    /// Maximum deal size, in fiat.
    pub limit_max: Decimal,
    pub payment_methods: Vec<String>,
    /// Free-form payment details shown to the counterparty.
    pub requisites: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ad {
    /// Fiat value of a crypto amount at this ad's price.
    #[must_use]
    pub fn fiat_value(&self, amount: Decimal) -> Decimal {
        amount * self.price
    }

    /// Whether a fiat notional falls inside the ad's deal-size limits.
    #[must_use]
    pub fn within_limits(&self, fiat_notional: Decimal) -> bool {
        fiat_notional >= self.limit_min && fiat_notional <= self.limit_max
    }
}

/// Dummy ad for unit tests.
#[cfg(any(test, feature = "test-helpers"))]
impl Ad {
    pub fn dummy_sell(owner: UserId, currency: &str, price: Decimal, available: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: AdId::new(),
            user_id: owner,
            side: AdSide::Sell,
            currency: currency.to_string(),
            price,
            available,
            limit_min: Decimal::ZERO,
            limit_max: Decimal::new(10_000_000, 0),
            payment_methods: vec!["bank-transfer".to_string()],
            requisites: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
