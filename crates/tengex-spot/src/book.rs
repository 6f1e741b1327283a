//! Price-time order book for one market.
//!
//! Two sorted sides plus an id index:
//!
//! ```text
//!   bids: BTreeMap<Reverse<price>, PriceLevel>   highest price first
//!   asks: BTreeMap<price, PriceLevel>            lowest price first
//!   index: order id -> (side, price)             O(log n) cancel
//! ```
//!
//! Only limit-priced orders rest here. Market orders and parked stop orders
//! never enter the book; the matcher consumes levels from the front via
//! [`OrderBook::front_at`] and [`OrderBook::pop_front_at`].

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use tengex_types::{MarketPair, Order, OrderId, OrderSide, Result, TengexError};

use crate::price_level::PriceLevel;

/// Resting-order book with price-time priority.
#[derive(Debug, Clone)]
pub struct OrderBook {
    /// Market this book belongs to.
    pub market: MarketPair,
    /// Buy side, keyed so iteration yields the highest bid first.
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    /// Sell side, iteration yields the lowest ask first.
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Fast lookup from order id to its resting location.
    index: HashMap<OrderId, (OrderSide, Decimal)>,
}

impl OrderBook {
    /// Creates an empty book for `market`.
    #[must_use]
    pub fn new(market: MarketPair) -> Self {
        Self {
            market,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Rests `order` at its limit price, at the back of that price's queue.
    ///
    /// # Errors
    ///
    /// Returns [`TengexError::DuplicateOrder`] if the id is already resting
    /// and [`TengexError::InvalidInput`] if the order carries no price.
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        let Some(price) = order.price else {
            return Err(TengexError::invalid_input(
                "only priced orders can rest in the book",
            ));
        };
        if self.index.contains_key(&order.id) {
            return Err(TengexError::DuplicateOrder(order.id));
        }

        self.index.insert(order.id, (order.side, price));
        match order.side {
            OrderSide::Buy => self
                .bids
                .entry(Reverse(price))
                .or_insert_with(|| PriceLevel::new(price))
                .push_back(order),
            OrderSide::Sell => self
                .asks
                .entry(price)
                .or_insert_with(|| PriceLevel::new(price))
                .push_back(order),
        }
        Ok(())
    }

    /// Removes a resting order by id, dropping its level if it empties.
    ///
    /// # Errors
    ///
    /// Returns [`TengexError::OrderNotFound`] if the id is not resting.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Result<Order> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or(TengexError::OrderNotFound(*order_id))?;

        let removed = match side {
            OrderSide::Buy => {
                let key = Reverse(price);
                let level = self.bids.get_mut(&key);
                let removed = level.and_then(|l| l.remove_order(order_id));
                if self.bids.get(&key).is_some_and(PriceLevel::is_empty) {
                    self.bids.remove(&key);
                }
                removed
            }
            OrderSide::Sell => {
                let level = self.asks.get_mut(&price);
                let removed = level.and_then(|l| l.remove_order(order_id));
                if self.asks.get(&price).is_some_and(PriceLevel::is_empty) {
                    self.asks.remove(&price);
                }
                removed
            }
        };

        removed.ok_or(TengexError::OrderNotFound(*order_id))
    }

    /// Removes and returns the front order of the level at (`side`, `price`).
    ///
    /// Cleans up the level and the id index. Returns `None` if no such level
    /// exists.
    pub fn pop_front_at(&mut self, side: OrderSide, price: Decimal) -> Option<Order> {
        let popped = match side {
            OrderSide::Buy => {
                let key = Reverse(price);
                let popped = self.bids.get_mut(&key).and_then(PriceLevel::pop_front);
                if self.bids.get(&key).is_some_and(PriceLevel::is_empty) {
                    self.bids.remove(&key);
                }
                popped
            }
            OrderSide::Sell => {
                let popped = self.asks.get_mut(&price).and_then(PriceLevel::pop_front);
                if self.asks.get(&price).is_some_and(PriceLevel::is_empty) {
                    self.asks.remove(&price);
                }
                popped
            }
        };
        if let Some(order) = &popped {
            self.index.remove(&order.id);
        }
        popped
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// The front order of the level at (`side`, `price`), if the level exists.
    #[must_use]
    pub fn front_at(&self, side: OrderSide, price: Decimal) -> Option<&Order> {
        match side {
            OrderSide::Buy => self.bids.get(&Reverse(price)).and_then(PriceLevel::front),
            OrderSide::Sell => self.asks.get(&price).and_then(PriceLevel::front),
        }
    }

    /// Mutable front order of the level at (`side`, `price`).
    pub fn front_at_mut(&mut self, side: OrderSide, price: Decimal) -> Option<&mut Order> {
        match side {
            OrderSide::Buy => self
                .bids
                .get_mut(&Reverse(price))
                .and_then(PriceLevel::front_mut),
            OrderSide::Sell => self.asks.get_mut(&price).and_then(PriceLevel::front_mut),
        }
    }

    /// Highest resting bid price.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|Reverse(price)| *price)
    }

    /// Lowest resting ask price.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Ask minus bid, when both sides are populated.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Midpoint of the best bid and ask.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Whether `order_id` is currently resting.
    #[must_use]
    pub fn contains_order(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    /// Total number of resting orders on both sides.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Number of distinct bid price levels.
    #[must_use]
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of distinct ask price levels.
    #[must_use]
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    /// Whether both sides are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Bid levels from the highest price down.
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Ask levels from the lowest price up.
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }
}
