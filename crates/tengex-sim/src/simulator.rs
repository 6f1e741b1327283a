//! # Market simulator
//!
//! Keeps a market visually alive by trading on it with a pool of synthetic
//! participants. The simulator holds no privileges: every action goes
//! through [`SpotEngine::place_order`] / [`SpotEngine::cancel_order`] under
//! ordinary user ids, funded by ordinary ledger credits. The engine's
//! `last` price is only ever derived from executed trades, so the
//! simulator steers it the way any trader would: by crossing the book.
//!
//! Each [`MarketSimulator::tick`]:
//! 1. steps an internal reference price by a bounded random amount,
//!    clamped into the configured band;
//! 2. with `order_probability`, has one participant quote a limit order a
//!    few ticks off the reference, sized as a bounded fraction of its
//!    available balance; with `taker_probability` a second participant
//!    then crosses it with a market order, printing a trade near the walk;
//! 3. with `cancel_probability`, cancels one random resting synthetic
//!    order.
//!
//! Engine rejections (funding, minimum size, open-order caps) are logged
//! and skipped; the ledger's own guards are what keep synthetic accounts
//! from ever going negative. Cadence belongs to the embedding host, which
//! calls `tick()` on whatever schedule it likes; nothing here depends on
//! wall-clock timing.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

use tengex_ledger::Ledger;
use tengex_spot::{OrderRequest, SpotEngine};
use tengex_types::{
    constants, MarketPair, OrderSide, Result, SimulatorConfig, TengexError, UserId,
};

/// A synthetic participant. The marker never leaves this crate; the
/// engine and ledger see nothing but the plain [`UserId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticTrader {
    pub user_id: UserId,
    pub is_marker: bool,
}

/// Drives one market with synthetic order flow.
#[derive(Debug)]
pub struct MarketSimulator {
    engine: Arc<SpotEngine>,
    ledger: Arc<Ledger>,
    market: MarketPair,
    config: SimulatorConfig,
    traders: Vec<SyntheticTrader>,
    rng: StdRng,
    /// Where the walk currently wants the price. Trades pull the market's
    /// `last` toward it; nothing writes `last` directly.
    reference_price: Decimal,
    tick_size: Decimal,
    min_order_size: Decimal,
    /// `max_step` expressed in whole ticks, at least one.
    step_ticks: i64,
}

impl MarketSimulator {
    /// Spawn the participant pool, credit each account its seed balances
    /// and position the reference price at the middle of the band.
    ///
    /// # Errors
    /// `UnknownMarket` if the market is not registered on the engine;
    /// `Configuration` for an empty pool, probabilities outside `[0, 1]`,
    /// an inverted band or non-positive step / sizing fractions.
    pub fn new(
        engine: Arc<SpotEngine>,
        ledger: Arc<Ledger>,
        market: MarketPair,
        config: SimulatorConfig,
        seed: u64,
    ) -> Result<Self> {
        Self::validate(&config)?;
        let market_config = engine.market_config(&market)?;

        let rng = StdRng::seed_from_u64(seed);
        let mut traders = Vec::with_capacity(config.participants);
        for _ in 0..config.participants {
            let trader = SyntheticTrader {
                user_id: UserId::new(),
                is_marker: true,
            };
            if config.seed_base > Decimal::ZERO {
                ledger.credit(trader.user_id, &market.base, config.seed_base)?;
            }
            if config.seed_quote > Decimal::ZERO {
                ledger.credit(trader.user_id, &market.quote, config.seed_quote)?;
            }
            traders.push(trader);
        }

        let tick_size = market_config.tick_size;
        let step_ticks = (config.max_step / tick_size).to_i64().unwrap_or(1).max(1);
        let reference_price = Self::aligned(
            (config.band_low + config.band_high) / Decimal::TWO,
            tick_size,
        );
        info!(
            market = %market,
            participants = traders.len(),
            reference = %reference_price,
            "market simulator spawned"
        );
        Ok(Self {
            engine,
            ledger,
            market,
            config,
            traders,
            rng,
            reference_price,
            tick_size,
            min_order_size: market_config.min_order_size,
            step_ticks,
        })
    }

    fn validate(config: &SimulatorConfig) -> Result<()> {
        if config.participants == 0 {
            return Err(TengexError::Configuration(
                "simulator needs at least one participant".to_string(),
            ));
        }
        for (name, p) in [
            ("order_probability", config.order_probability),
            ("taker_probability", config.taker_probability),
            ("cancel_probability", config.cancel_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(TengexError::Configuration(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        if config.band_low >= config.band_high {
            return Err(TengexError::Configuration(
                "price band must satisfy low < high".to_string(),
            ));
        }
        if config.max_step <= Decimal::ZERO {
            return Err(TengexError::Configuration(
                "max_step must be positive".to_string(),
            ));
        }
        if config.min_fraction <= Decimal::ZERO
            || config.min_fraction > config.max_fraction
            || config.max_fraction > Decimal::ONE
        {
            return Err(TengexError::Configuration(
                "sizing fractions must satisfy 0 < min <= max <= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// One round of synthetic activity.
    pub fn tick(&mut self) {
        self.step_reference();
        if self.rng.gen_bool(self.config.order_probability) {
            self.quote_round();
        }
        if self.rng.gen_bool(self.config.cancel_probability) {
            self.cancel_random_order();
        }
    }

    /// Run `ticks` rounds back to back.
    pub fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// The participant pool.
    #[must_use]
    pub fn traders(&self) -> &[SyntheticTrader] {
        &self.traders
    }

    /// Whether a user id belongs to this simulator's pool.
    #[must_use]
    pub fn is_synthetic(&self, user: UserId) -> bool {
        self.traders.iter().any(|t| t.user_id == user)
    }

    /// Current value of the internal reference walk.
    #[must_use]
    pub fn reference_price(&self) -> Decimal {
        self.reference_price
    }

    // =================================================================
    // Tick phases
    // =================================================================

    fn step_reference(&mut self) {
        let ticks = self.rng.gen_range(-self.step_ticks..=self.step_ticks);
        let stepped = self.reference_price + Decimal::from(ticks) * self.tick_size;
        self.reference_price = stepped.clamp(self.config.band_low, self.config.band_high);
    }

    /// One participant quotes near the reference; maybe another crosses it.
    fn quote_round(&mut self) {
        let maker_idx = self.rng.gen_range(0..self.traders.len());
        let maker = self.traders[maker_idx];
        let side = if self.rng.gen_bool(0.5) {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        let offset = Decimal::from(self.rng.gen_range(1_i64..=3)) * self.tick_size;
        let price = match side {
            OrderSide::Buy => self.reference_price - offset,
            OrderSide::Sell => self.reference_price + offset,
        };
        if price <= Decimal::ZERO {
            return;
        }
        let Some(quantity) = self.size_quote(maker.user_id, side, price) else {
            return;
        };

        let request =
            OrderRequest::limit(maker.user_id, self.market.clone(), side, price, quantity);
        let quote = match self.engine.place_order(request) {
            Ok(order) => order,
            Err(err) => {
                debug!(user = %maker.user_id, %err, "maker quote rejected");
                return;
            }
        };
        debug!(
            order = %quote.id,
            side = %side,
            price = %price,
            quantity = %quantity,
            "synthetic quote placed"
        );

        if self.rng.gen_bool(self.config.taker_probability) {
            self.fire_taker(maker_idx, side.opposite(), quantity);
        }
    }

    /// A second participant crosses the fresh quote with a market order
    /// for part of its size, printing a trade near the reference.
    fn fire_taker(&mut self, maker_idx: usize, side: OrderSide, maker_quantity: Decimal) {
        let taker = self.pick_other(maker_idx);
        let portion = Decimal::from(self.rng.gen_range(25_u32..=100)) / Decimal::ONE_HUNDRED;
        let quantity = (maker_quantity * portion).round_dp(constants::QTY_PRECISION);
        if quantity < self.min_order_size {
            return;
        }
        let request = OrderRequest::market(taker.user_id, self.market.clone(), side, quantity);
        match self.engine.place_order(request) {
            Ok(order) => debug!(order = %order.id, side = %side, "synthetic taker fired"),
            Err(err) => debug!(user = %taker.user_id, %err, "synthetic taker rejected"),
        }
    }

    fn cancel_random_order(&mut self) {
        let idx = self.rng.gen_range(0..self.traders.len());
        let trader = self.traders[idx];
        let open = match self.engine.open_orders(&self.market, trader.user_id) {
            Ok(open) if !open.is_empty() => open,
            Ok(_) => return,
            Err(err) => {
                debug!(%err, "open-order query failed");
                return;
            }
        };
        let victim = &open[self.rng.gen_range(0..open.len())];
        match self.engine.cancel_order(victim.id, trader.user_id) {
            Ok(_) => debug!(order = %victim.id, "synthetic order cancelled"),
            Err(err) => debug!(order = %victim.id, %err, "synthetic cancel rejected"),
        }
    }

    // =================================================================
    // Sizing
    // =================================================================

    /// Size a quote as a bounded fraction of the participant's available
    /// balance in the spending asset. `None` when the account cannot fund
    /// a minimum-sized order at this price.
    fn size_quote(&mut self, user: UserId, side: OrderSide, price: Decimal) -> Option<Decimal> {
        let available = match side {
            OrderSide::Sell => self.ledger.balance(user, &self.market.base).available,
            OrderSide::Buy => self.ledger.balance(user, &self.market.quote).available,
        };
        let budget = available * self.random_fraction();
        let quantity = match side {
            OrderSide::Sell => budget,
            OrderSide::Buy => budget / price,
        }
        .round_dp(constants::QTY_PRECISION);
        if quantity < self.min_order_size {
            return None;
        }
        Some(quantity)
    }

    fn random_fraction(&mut self) -> Decimal {
        let k = Decimal::from(self.rng.gen_range(0_u32..=10_000)) / Decimal::from(10_000);
        self.config.min_fraction + (self.config.max_fraction - self.config.min_fraction) * k
    }

    /// Uniform pick excluding one index; falls back to it for a pool of one.
    fn pick_other(&mut self, not: usize) -> SyntheticTrader {
        let len = self.traders.len();
        if len <= 1 {
            return self.traders[not];
        }
        let mut idx = self.rng.gen_range(0..len - 1);
        if idx >= not {
            idx += 1;
        }
        self.traders[idx]
    }

    fn aligned(price: Decimal, tick_size: Decimal) -> Decimal {
        (price / tick_size).round() * tick_size
    }
}
