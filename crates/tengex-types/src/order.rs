//! Order types for the Tengex matching engine.
//!
//! Limit and stop-limit orders reserve funds up front; market and plain stop
//! orders are funded fill-by-fill at match time. Stop variants are invisible
//! to matching until triggered, at which point they reclassify one way:
//! `Stop → Market`, `StopLimit → Limit`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Asset, MarketPair, OrderId, UserId};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The opposite side of the book.
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// The type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    Stop,
    StopLimit,
}

impl OrderType {
    /// Stop variants park off-book until their trigger fires.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop | Self::StopLimit)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "LIMIT"),
            Self::Market => write!(f, "MARKET"),
            Self::Stop => write!(f, "STOP"),
            Self::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Partial,
    Filled,
    Cancelled,
}

impl OrderStatus {
    /// Terminal orders accept no further fills or cancellation.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Core order struct.
///
/// `sequence` is assigned by the engine on acceptance, strictly increasing
/// per market. It breaks `created_at` ties for FIFO priority and maker
/// determination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub market: MarketPair,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    /// Limit price. Required for `Limit` and `StopLimit`, absent otherwise.
    pub price: Option<Decimal>,
    /// Trigger price. Required for `Stop` and `StopLimit`, absent otherwise.
    pub stop_price: Option<Decimal>,
    pub quantity: Decimal,
    pub remaining: Decimal,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.remaining.is_zero()
    }

    #[must_use]
    pub fn filled_qty(&self) -> Decimal {
        self.quantity - self.remaining
    }

    /// Whether a resting price on the opposite side crosses this order.
    #[must_use]
    pub fn crosses(&self, resting_price: Decimal) -> bool {
        match (self.order_type, self.side) {
            (OrderType::Market, _) => true,
            (_, OrderSide::Buy) => self.price.is_some_and(|p| p >= resting_price),
            (_, OrderSide::Sell) => self.price.is_some_and(|p| p <= resting_price),
        }
    }

    /// Whether this order reserves funds at placement time.
    ///
    /// Market and plain stop orders carry no reservation; the engine
    /// reserves per fill when they execute.
    #[must_use]
    pub fn requires_reservation(&self) -> bool {
        matches!(self.order_type, OrderType::Limit | OrderType::StopLimit)
    }

    /// The (currency, amount) reserved at placement, if any.
    ///
    /// Buy orders reserve `quantity x price` of the quote currency; sell
    /// orders reserve `quantity` of the base currency.
    #[must_use]
    pub fn placement_reservation(&self) -> Option<(Asset, Decimal)> {
        if !self.requires_reservation() {
            return None;
        }
        let price = self.price?;
        Some(match self.side {
            OrderSide::Buy => (self.market.quote.clone(), self.quantity * price),
            OrderSide::Sell => (self.market.base.clone(), self.quantity),
        })
    }

    /// The (currency, amount) still reserved for the unfilled remainder.
    ///
    /// This is what cancellation releases.
    #[must_use]
    pub fn remaining_reservation(&self) -> Option<(Asset, Decimal)> {
        if !self.requires_reservation() {
            return None;
        }
        let price = self.price?;
        Some(match self.side {
            OrderSide::Buy => (self.market.quote.clone(), self.remaining * price),
            OrderSide::Sell => (self.market.base.clone(), self.remaining),
        })
    }

    /// Whether a `last` price fires this stop order's trigger.
    ///
    /// Buy stops trigger when the market rises to the stop price or above;
    /// sell stops when it falls to the stop price or below.
    #[must_use]
    pub fn stop_triggered_by(&self, last: Decimal) -> bool {
        let Some(stop) = self.stop_price else {
            return false;
        };
        match self.side {
            OrderSide::Buy => last >= stop,
            OrderSide::Sell => last <= stop,
        }
    }

    /// One-way reclassification on trigger: `Stop -> Market`,
    /// `StopLimit -> Limit`. No-op for already-triggered orders.
    pub fn trigger(&mut self) {
        match self.order_type {
            OrderType::Stop => self.order_type = OrderType::Market,
            OrderType::StopLimit => self.order_type = OrderType::Limit,
            OrderType::Limit | OrderType::Market => {}
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(side: OrderSide, price: Decimal, qty: Decimal) -> Self {
        Self::dummy_limit_for_user(UserId::new(), side, price, qty)
    }

    pub fn dummy_limit_for_user(
        user_id: UserId,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
    ) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            market: MarketPair::new("BTC", "USDT"),
            side,
            order_type: OrderType::Limit,
            status: OrderStatus::Open,
            price: Some(price),
            stop_price: None,
            quantity: qty,
            remaining: qty,
            sequence: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn dummy_market(side: OrderSide, qty: Decimal) -> Self {
        Self {
            id: OrderId::new(),
            user_id: UserId::new(),
            market: MarketPair::new("BTC", "USDT"),
            side,
            order_type: OrderType::Market,
            status: OrderStatus::Open,
            price: None,
            stop_price: None,
            quantity: qty,
            remaining: qty,
            sequence: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn dummy_stop(side: OrderSide, stop_price: Decimal, qty: Decimal) -> Self {
        Self {
            id: OrderId::new(),
            user_id: UserId::new(),
            market: MarketPair::new("BTC", "USDT"),
            side,
            order_type: OrderType::Stop,
            status: OrderStatus::Open,
            price: None,
            stop_price: Some(stop_price),
            quantity: qty,
            remaining: qty,
            sequence: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn dummy_stop_limit(
        side: OrderSide,
        stop_price: Decimal,
        price: Decimal,
        qty: Decimal,
    ) -> Self {
        Self {
            id: OrderId::new(),
            user_id: UserId::new(),
            market: MarketPair::new("BTC", "USDT"),
            side,
            order_type: OrderType::StopLimit,
            status: OrderStatus::Open,
            price: Some(price),
            stop_price: Some(stop_price),
            quantity: qty,
            remaining: qty,
            sequence: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
