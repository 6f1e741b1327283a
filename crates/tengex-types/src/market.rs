//! Per-market statistics maintained by the matching engine.
//!
//! `last` is derived solely from executed trades; there is no privileged
//! write path for it. The 24h fields are plain accumulators; the embedding
//! host rolls the window by calling [`MarketStats::roll_window`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::MarketPair;

/// Rolling statistics for one market.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketStats {
    pub pair: MarketPair,
    /// Price of the most recent trade. `None` until the first trade.
    pub last: Option<Decimal>,
    /// First trade price of the current window.
    pub open_24h: Option<Decimal>,
    /// Highest trade price of the window. Only ratchets upward.
    pub high_24h: Option<Decimal>,
    /// Lowest trade price of the window. Only ratchets downward.
    pub low_24h: Option<Decimal>,
    /// Traded base volume in the window.
    pub volume_base_24h: Decimal,
    /// Traded quote volume in the window.
    pub volume_quote_24h: Decimal,
}

impl MarketStats {
    #[must_use]
    pub fn new(pair: MarketPair) -> Self {
        Self {
            pair,
            last: None,
            open_24h: None,
            high_24h: None,
            low_24h: None,
            volume_base_24h: Decimal::ZERO,
            volume_quote_24h: Decimal::ZERO,
        }
    }

    /// Fold one executed trade into the stats. Called after every trade,
    /// including synthetic (simulator) ones.
    pub fn apply_trade(&mut self, price: Decimal, quantity: Decimal, quote_amount: Decimal) {
        self.last = Some(price);
        if self.open_24h.is_none() {
            self.open_24h = Some(price);
        }
        self.high_24h = Some(match self.high_24h {
            Some(high) if high >= price => high,
            _ => price,
        });
        self.low_24h = Some(match self.low_24h {
            Some(low) if low <= price => low,
            _ => price,
        });
        self.volume_base_24h += quantity;
        self.volume_quote_24h += quote_amount;
    }

    /// Start a fresh window. `last` survives the roll; the new window opens
    /// at the pre-roll `last`.
    pub fn roll_window(&mut self) {
        self.open_24h = self.last;
        self.high_24h = self.last;
        self.low_24h = self.last;
        self.volume_base_24h = Decimal::ZERO;
        self.volume_quote_24h = Decimal::ZERO;
    }

    /// Signed change of `last` against the window open, if both exist.
    #[must_use]
    pub fn change_24h(&self) -> Option<Decimal> {
        Some(self.last? - self.open_24h?)
    }
}
