//! Parking area for untriggered stop orders.
//!
//! Stop and stop-limit orders never rest in the book. They wait here, in
//! placement order, until a trade moves the market's last price across their
//! trigger threshold. The engine then drains the triggered subset and routes
//! each one through the normal matching path as a market or limit order.

use rust_decimal::Decimal;
use tengex_types::{Order, OrderId, UserId};

/// Stop orders waiting for their trigger price, oldest first.
#[derive(Debug, Clone, Default)]
pub struct StopRack {
    parked: Vec<Order>,
}

impl StopRack {
    /// Creates an empty rack.
    #[must_use]
    pub fn new() -> Self {
        Self { parked: Vec::new() }
    }

    /// Parks a stop order at the back of the rack.
    pub fn park(&mut self, order: Order) {
        self.parked.push(order);
    }

    /// Removes and returns every parked order triggered by `last`.
    ///
    /// Buy stops trigger when `last` is at or above their stop price, sell
    /// stops when `last` is at or below it. The returned orders keep their
    /// placement order; untriggered orders stay parked.
    pub fn collect_triggered(&mut self, last: Decimal) -> Vec<Order> {
        if self.parked.iter().all(|o| !o.stop_triggered_by(last)) {
            return Vec::new();
        }
        let parked = std::mem::take(&mut self.parked);
        let (triggered, kept) = parked
            .into_iter()
            .partition(|o| o.stop_triggered_by(last));
        self.parked = kept;
        triggered
    }

    /// Removes a parked order by id, if present.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        let pos = self.parked.iter().position(|o| o.id == *order_id)?;
        Some(self.parked.remove(pos))
    }

    /// Whether `order_id` is parked here.
    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.parked.iter().any(|o| o.id == *order_id)
    }

    /// Parked orders belonging to `user`, in placement order.
    pub fn orders_for(&self, user: UserId) -> impl Iterator<Item = &Order> {
        self.parked.iter().filter(move |o| o.user_id == user)
    }

    /// Number of parked orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parked.len()
    }

    /// Whether the rack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }
}
