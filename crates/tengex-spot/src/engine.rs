//! Continuous spot matching engine.
//!
//! One engine serves many markets. Each market's mutable state (book, stop
//! rack, stats, order history) sits behind its own lock, so order flow on
//! different markets never contends; all fund movements go through the
//! shared [`Ledger`].
//!
//! ## Order flow
//!
//! ```text
//! place_order
//!   ├─ validate request and market rules
//!   ├─ reserve funds (limit / stop-limit only)
//!   ├─ stop / stop-limit ──────────────► stop rack (parked)
//!   └─ limit / market ─► taker pass ─► rest remainder (limit only)
//!                             │
//!                             ▼
//!                      trigger loop: every trade moves `last`;
//!                      stops whose threshold is crossed convert
//!                      one-way and re-enter the taker pass
//! ```
//!
//! Matching is strict price-time priority and every trade executes at the
//! resting order's price. The maker of a trade is the order with the earlier
//! `created_at` (sequence breaks ties), which is usually but not always the
//! resting one: a stop order parked before the resting order was placed
//! takes liquidity at the maker rate once triggered.
//!
//! The trigger loop terminates because conversion is one-way: every parked
//! order leaves the rack at most once and nothing re-parks during the loop.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tengex_ledger::{Ledger, TradeSettlement};
use tengex_types::{
    FeeSchedule, Fill, FillRole, MarketConfig, MarketPair, MarketStats, Order, OrderId, OrderSide,
    OrderStatus, OrderType, Result, TengexError, Trade, TradeId, UserId,
};
use tracing::{debug, info};

use crate::book::OrderBook;
use crate::stops::StopRack;

/// An order placement request as submitted through the request layer.
///
/// Fields irrelevant to the order type (a price on a market order, a stop
/// price on a limit order) are ignored at acceptance, not rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user_id: UserId,
    pub market: MarketPair,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
}

impl OrderRequest {
    /// A limit order request.
    #[must_use]
    pub fn limit(
        user_id: UserId,
        market: MarketPair,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            user_id,
            market,
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
        }
    }

    /// A market order request.
    #[must_use]
    pub fn market(user_id: UserId, market: MarketPair, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            user_id,
            market,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
        }
    }

    /// A stop order request (converts to market on trigger).
    #[must_use]
    pub fn stop(
        user_id: UserId,
        market: MarketPair,
        side: OrderSide,
        stop_price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            user_id,
            market,
            side,
            order_type: OrderType::Stop,
            quantity,
            price: None,
            stop_price: Some(stop_price),
        }
    }

    /// A stop-limit order request (converts to limit on trigger).
    #[must_use]
    pub fn stop_limit(
        user_id: UserId,
        market: MarketPair,
        side: OrderSide,
        stop_price: Decimal,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            user_id,
            market,
            side,
            order_type: OrderType::StopLimit,
            quantity,
            price: Some(price),
            stop_price: Some(stop_price),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(TengexError::invalid_input(format!(
                "order quantity must be positive, got {}",
                self.quantity
            )));
        }
        match self.order_type {
            OrderType::Limit | OrderType::StopLimit => match self.price {
                Some(price) if price > Decimal::ZERO => {}
                Some(price) => {
                    return Err(TengexError::invalid_input(format!(
                        "order price must be positive, got {price}"
                    )));
                }
                None => {
                    return Err(TengexError::invalid_input(format!(
                        "{} order requires a price",
                        self.order_type
                    )));
                }
            },
            OrderType::Market | OrderType::Stop => {}
        }
        if self.order_type.is_stop() {
            match self.stop_price {
                Some(stop) if stop > Decimal::ZERO => {}
                Some(stop) => {
                    return Err(TengexError::invalid_input(format!(
                        "stop price must be positive, got {stop}"
                    )));
                }
                None => {
                    return Err(TengexError::invalid_input(format!(
                        "{} order requires a stop price",
                        self.order_type
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Everything the engine tracks for one market, guarded by one lock.
#[derive(Debug)]
struct MarketState {
    config: MarketConfig,
    book: OrderBook,
    stops: StopRack,
    stats: MarketStats,
    /// Every order ever accepted, including terminal ones.
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
    fills: Vec<Fill>,
    /// Resting plus parked order count per user, for the open-order cap.
    open_counts: HashMap<UserId, usize>,
    next_sequence: u64,
}

impl MarketState {
    fn new(config: MarketConfig) -> Self {
        let pair = config.pair();
        Self {
            config,
            book: OrderBook::new(pair.clone()),
            stops: StopRack::new(),
            stats: MarketStats::new(pair),
            orders: HashMap::new(),
            trades: Vec::new(),
            fills: Vec::new(),
            open_counts: HashMap::new(),
            next_sequence: 0,
        }
    }

    fn alloc_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    /// Write-through of an order snapshot into the history map.
    fn sync_order(&mut self, order: &Order) {
        self.orders.insert(order.id, order.clone());
    }

    fn bump_open(&mut self, user: UserId) {
        *self.open_counts.entry(user).or_insert(0) += 1;
    }

    fn drop_open(&mut self, user: UserId) {
        if let Some(count) = self.open_counts.get_mut(&user) {
            *count = count.saturating_sub(1);
        }
    }
}

/// The continuous matcher for all registered markets.
#[derive(Debug)]
pub struct SpotEngine {
    ledger: Arc<Ledger>,
    fees: FeeSchedule,
    markets: RwLock<HashMap<MarketPair, Arc<Mutex<MarketState>>>>,
}

impl SpotEngine {
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, fees: FeeSchedule) -> Self {
        Self {
            ledger,
            fees,
            markets: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a market so it can accept orders.
    ///
    /// # Errors
    /// `Configuration` if the pair is already registered.
    pub fn register_market(&self, config: MarketConfig) -> Result<()> {
        let pair = config.pair();
        let mut markets = self.markets.write();
        if markets.contains_key(&pair) {
            return Err(TengexError::Configuration(format!(
                "market {pair} is already registered"
            )));
        }
        markets.insert(pair.clone(), Arc::new(Mutex::new(MarketState::new(config))));
        info!(market = %pair, "market registered");
        Ok(())
    }

    fn state_for(&self, market: &MarketPair) -> Result<Arc<Mutex<MarketState>>> {
        self.markets
            .read()
            .get(market)
            .cloned()
            .ok_or_else(|| TengexError::UnknownMarket {
                symbol: market.symbol(),
            })
    }

    // =========================================================================
    // Order entry
    // =========================================================================

    /// Accepts an order: validates, reserves funds, matches or parks it.
    ///
    /// Returns the order's final snapshot once the matching pass and any
    /// chained stop triggers have run.
    ///
    /// # Errors
    /// `InvalidInput` / `UnknownMarket` / `OrderLimitExceeded` on a rejected
    /// request, `InsufficientFunds` when the up-front reservation fails. No
    /// state changes on any error return.
    pub fn place_order(&self, request: OrderRequest) -> Result<Order> {
        request.validate()?;
        let state_arc = self.state_for(&request.market)?;
        let mut state = state_arc.lock();

        if request.quantity < state.config.min_order_size {
            return Err(TengexError::invalid_input(format!(
                "quantity {} below market minimum {}",
                request.quantity, state.config.min_order_size
            )));
        }
        let effective_price = match request.order_type {
            OrderType::Limit | OrderType::StopLimit => request.price,
            OrderType::Market | OrderType::Stop => None,
        };
        if let Some(price) = effective_price {
            let tick = state.config.tick_size;
            if !tick.is_zero() && !(price % tick).is_zero() {
                return Err(TengexError::invalid_input(format!(
                    "price {price} not aligned to tick size {tick}"
                )));
            }
        }
        let open = state
            .open_counts
            .get(&request.user_id)
            .copied()
            .unwrap_or(0);
        if open >= state.config.max_open_orders_per_user {
            return Err(TengexError::OrderLimitExceeded);
        }

        let now = Utc::now();
        let mut order = Order {
            id: OrderId::new(),
            user_id: request.user_id,
            market: request.market.clone(),
            side: request.side,
            order_type: request.order_type,
            status: OrderStatus::Open,
            price: effective_price,
            stop_price: if request.order_type.is_stop() {
                request.stop_price
            } else {
                None
            },
            quantity: request.quantity,
            remaining: request.quantity,
            sequence: 0,
            created_at: now,
            updated_at: now,
        };

        if let Some((asset, amount)) = order.placement_reservation() {
            self.ledger.reserve(order.user_id, &asset, amount)?;
        }
        order.sequence = state.alloc_sequence();
        info!(
            order = %order.id,
            user = %order.user_id,
            market = %order.market,
            side = %order.side,
            kind = %order.order_type,
            qty = %order.quantity,
            "order accepted"
        );

        if order.order_type.is_stop() {
            state.stops.park(order.clone());
            state.bump_open(order.user_id);
            state.sync_order(&order);
            return Ok(order);
        }

        self.run_taker_pass(&mut state, &mut order)?;
        self.finish_pass(&mut state, &mut order)?;
        self.run_trigger_loop(&mut state)?;
        // Chained triggers may have filled the order further after it rested.
        Ok(state.orders.get(&order.id).cloned().unwrap_or(order))
    }

    /// Cancels an open or partially filled order owned by `user`.
    ///
    /// Releases the reservation backing the unfilled remainder. A spent
    /// market-order remainder holds no reservation, so its cancellation only
    /// flips the status.
    ///
    /// # Errors
    /// `OrderNotFound` for an unknown id, `Forbidden` when `user` does not
    /// own the order, `OrderNotCancellable` once it is filled or cancelled.
    pub fn cancel_order(&self, order_id: OrderId, user: UserId) -> Result<Order> {
        let states: Vec<Arc<Mutex<MarketState>>> =
            self.markets.read().values().cloned().collect();
        for state_arc in states {
            let mut state = state_arc.lock();
            if state.orders.contains_key(&order_id) {
                return self.cancel_in(&mut state, order_id, user);
            }
        }
        Err(TengexError::OrderNotFound(order_id))
    }

    fn cancel_in(&self, state: &mut MarketState, order_id: OrderId, user: UserId) -> Result<Order> {
        let current = state
            .orders
            .get(&order_id)
            .ok_or(TengexError::OrderNotFound(order_id))?
            .clone();
        if current.user_id != user {
            return Err(TengexError::forbidden("only the order's owner may cancel"));
        }
        if current.status.is_terminal() {
            return Err(TengexError::OrderNotCancellable);
        }

        // The live copy with the authoritative `remaining` is on the book or
        // the stop rack; a spent market order is in neither.
        let resting = state.book.remove_order(&order_id).ok();
        let parked = if resting.is_none() {
            state.stops.remove(&order_id)
        } else {
            None
        };
        if resting.is_some() || parked.is_some() {
            state.drop_open(current.user_id);
        }
        let live = resting.or(parked).unwrap_or(current);

        if let Some((asset, amount)) = live.remaining_reservation() {
            if amount > Decimal::ZERO {
                self.ledger.release(live.user_id, &asset, amount)?;
            }
        }

        let mut cancelled = live;
        cancelled.status = OrderStatus::Cancelled;
        cancelled.updated_at = Utc::now();
        state.sync_order(&cancelled);
        info!(order = %order_id, user = %user, "order cancelled");
        Ok(cancelled)
    }

    // =========================================================================
    // Matching
    // =========================================================================

    /// Consumes resting liquidity until `taker` is filled, stops crossing,
    /// or (for unreserved takers) runs out of funds.
    fn run_taker_pass(&self, state: &mut MarketState, taker: &mut Order) -> Result<()> {
        while !taker.remaining.is_zero() {
            let best = match taker.side {
                OrderSide::Buy => state.book.best_ask(),
                OrderSide::Sell => state.book.best_bid(),
            };
            let Some(best_price) = best else { break };
            if !taker.crosses(best_price) {
                break;
            }
            if !self.fill_best(state, taker, best_price)? {
                break;
            }
        }
        Ok(())
    }

    /// Executes one fill between `taker` and the front resting order at
    /// `resting_price`. Returns `Ok(false)` when the pass must stop without
    /// a fill (no front order, or a market taker that cannot fund the fill).
    fn fill_best(
        &self,
        state: &mut MarketState,
        taker: &mut Order,
        resting_price: Decimal,
    ) -> Result<bool> {
        let resting_side = taker.side.opposite();
        let Some(resting) = state.book.front_at(resting_side, resting_price).cloned() else {
            return Ok(false);
        };

        let quantity = taker.remaining.min(resting.remaining);
        let quote_amount = resting_price * quantity;

        // Market takers carry no reservation; fund each fill as it happens.
        if !taker.requires_reservation() {
            let (asset, needed) = match taker.side {
                OrderSide::Buy => (taker.market.quote.clone(), quote_amount),
                OrderSide::Sell => (taker.market.base.clone(), quantity),
            };
            match self.ledger.reserve(taker.user_id, &asset, needed) {
                Ok(()) => {}
                Err(TengexError::InsufficientFunds { .. }) => {
                    debug!(
                        order = %taker.id,
                        asset,
                        needed = %needed,
                        "market order out of funds, ending pass"
                    );
                    return Ok(false);
                }
                Err(err) => return Err(err),
            }
        }

        let (buyer, seller) = match taker.side {
            OrderSide::Buy => (&*taker, &resting),
            OrderSide::Sell => (&resting, &*taker),
        };
        let taker_is_earlier =
            (taker.created_at, taker.sequence) < (resting.created_at, resting.sequence);
        let (maker_order_id, taker_order_id) = if taker_is_earlier {
            (taker.id, resting.id)
        } else {
            (resting.id, taker.id)
        };
        let buyer_role = if buyer.id == maker_order_id {
            FillRole::Maker
        } else {
            FillRole::Taker
        };
        let seller_role = if seller.id == maker_order_id {
            FillRole::Maker
        } else {
            FillRole::Taker
        };
        let buy_rate = self.fees.rate_for(buyer_role);
        let sell_rate = self.fees.rate_for(seller_role);
        let buyer_credit = quantity * (Decimal::ONE - buy_rate);
        let seller_credit = quote_amount * (Decimal::ONE - sell_rate);
        let buyer_id = buyer.user_id;
        let seller_id = seller.user_id;
        let buy_order_id = buyer.id;
        let sell_order_id = seller.id;

        self.ledger.settle_trade(&TradeSettlement {
            buyer: buyer_id,
            seller: seller_id,
            base: taker.market.base.clone(),
            quote: taker.market.quote.clone(),
            base_amount: quantity,
            quote_amount,
            buyer_credit,
            seller_credit,
        })?;

        // A reserved buyer that matched below its limit gets the difference
        // back, keeping its locked quote at exactly `remaining x limit`.
        if taker.side == OrderSide::Buy && taker.requires_reservation() {
            if let Some(limit) = taker.price {
                let excess = (limit - resting_price) * quantity;
                if excess > Decimal::ZERO {
                    self.ledger
                        .release(taker.user_id, &taker.market.quote, excess)?;
                }
            }
        }

        // Fees leak in kind: base from the buyer's credit, quote from the
        // seller's.
        self.ledger
            .record_fee(&taker.market.base, quantity * buy_rate);
        self.ledger
            .record_fee(&taker.market.quote, quote_amount * sell_rate);

        let now = Utc::now();
        let trade = Trade {
            id: TradeId::new(),
            market: taker.market.clone(),
            buy_order_id,
            buyer_user_id: buyer_id,
            sell_order_id,
            seller_user_id: seller_id,
            maker_order_id,
            taker_order_id,
            price: resting_price,
            quantity,
            quote_amount,
            executed_at: now,
        };
        state.fills.push(Fill {
            trade_id: trade.id,
            order_id: buy_order_id,
            user_id: buyer_id,
            side: OrderSide::Buy,
            role: buyer_role,
            price: resting_price,
            quantity,
            fee: quote_amount * buy_rate,
            executed_at: now,
        });
        state.fills.push(Fill {
            trade_id: trade.id,
            order_id: sell_order_id,
            user_id: seller_id,
            side: OrderSide::Sell,
            role: seller_role,
            price: resting_price,
            quantity,
            fee: quote_amount * sell_rate,
            executed_at: now,
        });
        state.stats.apply_trade(resting_price, quantity, quote_amount);
        debug!(
            trade = %trade.id,
            market = %trade.market,
            price = %resting_price,
            qty = %quantity,
            maker = %maker_order_id,
            "trade executed"
        );
        state.trades.push(trade);

        taker.remaining -= quantity;
        taker.status = if taker.remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
        taker.updated_at = now;

        let resting_after = {
            let front = state
                .book
                .front_at_mut(resting_side, resting_price)
                .ok_or_else(|| {
                    TengexError::Internal("resting order vanished mid-fill".to_string())
                })?;
            front.remaining -= quantity;
            front.status = if front.remaining.is_zero() {
                OrderStatus::Filled
            } else {
                OrderStatus::Partial
            };
            front.updated_at = now;
            front.clone()
        };
        if resting_after.is_filled() {
            state.book.pop_front_at(resting_side, resting_price);
            state.drop_open(resting_after.user_id);
        }
        state.sync_order(&resting_after);
        state.sync_order(taker);
        Ok(true)
    }

    /// Rests an unfilled limit remainder; a market remainder goes `Partial`
    /// and never rests.
    fn finish_pass(&self, state: &mut MarketState, order: &mut Order) -> Result<()> {
        if order.is_filled() {
            state.sync_order(order);
            return Ok(());
        }
        match order.order_type {
            OrderType::Limit => {
                state.book.insert_order(order.clone())?;
                state.bump_open(order.user_id);
            }
            OrderType::Market => {
                order.status = OrderStatus::Partial;
                order.updated_at = Utc::now();
                debug!(
                    order = %order.id,
                    remaining = %order.remaining,
                    "market order remainder left unfilled"
                );
            }
            // Stops are parked before matching; they never reach this point.
            OrderType::Stop | OrderType::StopLimit => {}
        }
        state.sync_order(order);
        Ok(())
    }

    /// Converts and matches every stop order triggered by the current last
    /// price, repeating until a pass produces no further triggers.
    fn run_trigger_loop(&self, state: &mut MarketState) -> Result<()> {
        loop {
            let Some(last) = state.stats.last else {
                return Ok(());
            };
            let triggered = state.stops.collect_triggered(last);
            if triggered.is_empty() {
                return Ok(());
            }
            for mut order in triggered {
                state.drop_open(order.user_id);
                order.trigger();
                order.updated_at = Utc::now();
                info!(
                    order = %order.id,
                    kind = %order.order_type,
                    last = %last,
                    "stop order triggered"
                );
                self.run_taker_pass(state, &mut order)?;
                self.finish_pass(state, &mut order)?;
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshot of an order by id, searched across markets.
    #[must_use]
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        let states: Vec<Arc<Mutex<MarketState>>> =
            self.markets.read().values().cloned().collect();
        for state_arc in states {
            let state = state_arc.lock();
            if let Some(order) = state.orders.get(&order_id) {
                return Some(order.clone());
            }
        }
        None
    }

    /// A user's resting and parked orders in one market, oldest first.
    ///
    /// # Errors
    /// `UnknownMarket` if the pair is not registered.
    pub fn open_orders(&self, market: &MarketPair, user: UserId) -> Result<Vec<Order>> {
        let state_arc = self.state_for(market)?;
        let state = state_arc.lock();
        let mut open: Vec<Order> = state
            .orders
            .values()
            .filter(|o| {
                o.user_id == user
                    && (state.book.contains_order(&o.id) || state.stops.contains(&o.id))
            })
            .cloned()
            .collect();
        open.sort_by_key(|o| o.sequence);
        Ok(open)
    }

    /// All trades executed in a market, in execution order.
    ///
    /// # Errors
    /// `UnknownMarket` if the pair is not registered.
    pub fn trades(&self, market: &MarketPair) -> Result<Vec<Trade>> {
        let state_arc = self.state_for(market)?;
        let state = state_arc.lock();
        Ok(state.trades.clone())
    }

    /// All fills recorded in a market, two per trade.
    ///
    /// # Errors
    /// `UnknownMarket` if the pair is not registered.
    pub fn fills(&self, market: &MarketPair) -> Result<Vec<Fill>> {
        let state_arc = self.state_for(market)?;
        let state = state_arc.lock();
        Ok(state.fills.clone())
    }

    /// The configuration a market was registered with.
    ///
    /// # Errors
    /// `UnknownMarket` if the pair is not registered.
    pub fn market_config(&self, market: &MarketPair) -> Result<MarketConfig> {
        let state_arc = self.state_for(market)?;
        let state = state_arc.lock();
        Ok(state.config.clone())
    }

    /// Current market statistics.
    ///
    /// # Errors
    /// `UnknownMarket` if the pair is not registered.
    pub fn stats(&self, market: &MarketPair) -> Result<MarketStats> {
        let state_arc = self.state_for(market)?;
        let state = state_arc.lock();
        Ok(state.stats.clone())
    }

    /// Best bid and best ask.
    ///
    /// # Errors
    /// `UnknownMarket` if the pair is not registered.
    pub fn top_of_book(&self, market: &MarketPair) -> Result<(Option<Decimal>, Option<Decimal>)> {
        let state_arc = self.state_for(market)?;
        let state = state_arc.lock();
        Ok((state.book.best_bid(), state.book.best_ask()))
    }

    /// Reopens the stats window at the current last price.
    ///
    /// # Errors
    /// `UnknownMarket` if the pair is not registered.
    pub fn roll_stats_window(&self, market: &MarketPair) -> Result<()> {
        let state_arc = self.state_for(market)?;
        let mut state = state_arc.lock();
        state.stats.roll_window();
        Ok(())
    }
}
