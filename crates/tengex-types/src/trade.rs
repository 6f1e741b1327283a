//! Trade and fill types produced by the Tengex matching engine.
//!
//! A [`Trade`] is the immutable record of one match between a buy and a sell
//! order at the resting order's price. Each trade spawns exactly two [`Fill`]
//! rows, one per side, carrying that side's fee.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketPair, OrderId, OrderSide, TradeId, UserId};

/// Fee role of an order within one trade.
///
/// The maker is the order with the earlier `created_at` (sequence breaks
/// ties), not necessarily the resting one: a stop order parked before the
/// resting order was placed takes liquidity at the maker rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FillRole {
    Maker,
    Taker,
}

impl std::fmt::Display for FillRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Maker => write!(f, "MAKER"),
            Self::Taker => write!(f, "TAKER"),
        }
    }
}

/// A trade produced by the continuous matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub market: MarketPair,
    pub buy_order_id: OrderId,
    pub buyer_user_id: UserId,
    pub sell_order_id: OrderId,
    pub seller_user_id: UserId,
    /// The order paying the maker rate (earlier `created_at`).
    pub maker_order_id: OrderId,
    /// The order paying the taker rate.
    pub taker_order_id: OrderId,
    /// Execution price, always the resting order's price.
    pub price: Decimal,
    /// Executed quantity in base currency.
    pub quantity: Decimal,
    /// Quote amount = price x quantity.
    pub quote_amount: Decimal,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    /// The fee-relevant notional value (`quote_amount`).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quote_amount
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}] {} {} @ {} = {}",
            self.id, self.market, self.quantity, self.price, self.quote_amount,
        )
    }
}

/// One side's record of a trade.
///
/// `fee` is denominated in the quote currency regardless of side; the
/// buyer's haircut is taken in kind from the base credit, the seller's from
/// the quote credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub trade_id: TradeId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub side: OrderSide,
    pub role: FillRole,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Fee charged to this side, in quote currency.
    pub fee: Decimal,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade() -> Trade {
        Trade {
            id: TradeId::new(),
            market: MarketPair::new("BTC", "USDT"),
            buy_order_id: OrderId::new(),
            buyer_user_id: UserId::new(),
            sell_order_id: OrderId::new(),
            seller_user_id: UserId::new(),
            maker_order_id: OrderId::new(),
            taker_order_id: OrderId::new(),
            price: Decimal::new(50000, 0),
            quantity: Decimal::new(1, 0),
            quote_amount: Decimal::new(50000, 0),
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn trade_notional() {
        let t = make_trade();
        assert_eq!(t.notional(), Decimal::new(50000, 0));
    }

    #[test]
    fn trade_display() {
        let t = make_trade();
        let s = format!("{t}");
        assert!(s.contains("BTC/USDT"));
        assert!(s.contains("50000"));
    }

    #[test]
    fn trade_serde_roundtrip() {
        let trade = make_trade();
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade.id, back.id);
        assert_eq!(trade.price, back.price);
        assert_eq!(trade.quantity, back.quantity);
    }

    #[test]
    fn fill_role_display() {
        assert_eq!(format!("{}", FillRole::Maker), "MAKER");
        assert_eq!(format!("{}", FillRole::Taker), "TAKER");
    }
}
