//! A single price level inside the order book.
//!
//! Every resting order at the same price shares one [`PriceLevel`]. Orders
//! queue FIFO: the earliest arrival sits at the front and is matched first,
//! which is the "time" half of price-time priority.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use tengex_types::{Order, OrderId};

/// FIFO queue of resting orders at one price.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// Price shared by every order in this level.
    pub price: Decimal,
    /// Resting orders, oldest first.
    pub orders: VecDeque<Order>,
}

impl PriceLevel {
    /// Creates an empty level at `price`.
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Appends an order at the back of the queue.
    pub fn push_back(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Puts an order back at the front of the queue.
    ///
    /// Used when a partially matched resting order keeps its place in line.
    pub fn push_front(&mut self, order: Order) {
        self.orders.push_front(order);
    }

    /// Removes and returns the order at the front of the queue.
    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    /// The order currently first in line, if any.
    #[must_use]
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Mutable access to the order first in line, if any.
    pub fn front_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    /// Sum of the unfilled quantity across every order in the level.
    #[must_use]
    pub fn total_quantity(&self) -> Decimal {
        self.orders.iter().map(|o| o.remaining).sum()
    }

    /// Removes the order with `order_id` from anywhere in the queue.
    ///
    /// Returns the removed order, or `None` if it was not in this level.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == *order_id)?;
        self.orders.remove(pos)
    }

    /// Whether the level holds no orders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Number of orders in the level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }
}
