//! Configuration types for Tengex markets, fees, deals and the simulator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{constants, Asset, FillRole, MarketPair};

/// Maker/taker fee schedule. Rates are fractions (0.001 = 0.1%), applied to
/// the quote notional `price x quantity` of each trade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeSchedule {
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
}

impl FeeSchedule {
    /// The rate charged to the given fill role.
    #[must_use]
    pub fn rate_for(&self, role: FillRole) -> Decimal {
        match role {
            FillRole::Maker => self.maker_rate,
            FillRole::Taker => self.taker_rate,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            maker_rate: Decimal::new(constants::DEFAULT_MAKER_FEE_BPS, 4),
            taker_rate: Decimal::new(constants::DEFAULT_TAKER_FEE_BPS, 4),
        }
    }
}

/// Per-market configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Base currency (e.g., "BTC").
    pub base: String,
    /// Quote currency (e.g., "USDT").
    pub quote: String,
    /// Minimum order size in base currency.
    pub min_order_size: Decimal,
    /// Tick size (price granularity).
    pub tick_size: Decimal,
    /// Maximum number of open orders per user for this market.
    pub max_open_orders_per_user: usize,
}

impl MarketConfig {
    /// Create a default BTC/USDT market config.
    #[must_use]
    pub fn btc_usdt() -> Self {
        Self {
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            min_order_size: Decimal::new(1, 5), // 0.00001 BTC
            tick_size: Decimal::new(1, 2),      // 0.01 USDT
            max_open_orders_per_user: constants::DEFAULT_MAX_OPEN_ORDERS_PER_USER,
        }
    }

    /// Create a default USDT/KZT market config.
    #[must_use]
    pub fn usdt_kzt() -> Self {
        Self {
            base: "USDT".to_string(),
            quote: "KZT".to_string(),
            min_order_size: Decimal::new(1, 2), // 0.01 USDT
            tick_size: Decimal::new(1, 2),      // 0.01 KZT
            max_open_orders_per_user: constants::DEFAULT_MAX_OPEN_ORDERS_PER_USER,
        }
    }

    /// The market pair identifier.
    #[must_use]
    pub fn pair(&self) -> MarketPair {
        MarketPair::new(self.base.clone(), self.quote.clone())
    }

    /// Returns the market symbol (e.g., "BTC/USDT").
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

/// P2P desk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealConfig {
    /// Default payment deadline in minutes.
    pub deadline_minutes: i64,
    /// The fiat currency deals settle in.
    pub fiat: Asset,
}

impl DealConfig {
    /// The deadline to apply, clamped into
    /// [`constants::MIN_DEAL_DEADLINE_MINUTES`, `constants::MAX_DEAL_DEADLINE_MINUTES`].
    #[must_use]
    pub fn clamped_minutes(&self, requested: Option<i64>) -> i64 {
        requested.unwrap_or(self.deadline_minutes).clamp(
            constants::MIN_DEAL_DEADLINE_MINUTES,
            constants::MAX_DEAL_DEADLINE_MINUTES,
        )
    }
}

impl Default for DealConfig {
    fn default() -> Self {
        Self {
            deadline_minutes: constants::DEFAULT_DEAL_DEADLINE_MINUTES,
            fiat: "KZT".to_string(),
        }
    }
}

/// Market simulator configuration.
///
/// Probabilities are per tick; sizing fractions apply to the acting
/// participant's available balance at the time of the quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Number of synthetic participants.
    pub participants: usize,
    /// Lower clamp of the reference-price random walk.
    pub band_low: Decimal,
    /// Upper clamp of the reference-price random walk.
    pub band_high: Decimal,
    /// Maximum absolute price step per tick.
    pub max_step: Decimal,
    /// Probability of quoting a resting limit order on a tick.
    pub order_probability: f64,
    /// Probability that a quote is followed by a crossing taker order.
    pub taker_probability: f64,
    /// Probability of cancelling one resting synthetic order on a tick.
    pub cancel_probability: f64,
    /// Smallest order size as a fraction of available balance.
    pub min_fraction: Decimal,
    /// Largest order size as a fraction of available balance.
    pub max_fraction: Decimal,
    /// Base-currency balance credited to each participant at spawn.
    pub seed_base: Decimal,
    /// Quote-currency balance credited to each participant at spawn.
    pub seed_quote: Decimal,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            participants: constants::DEFAULT_SIM_PARTICIPANTS,
            band_low: Decimal::new(480, 0),
            band_high: Decimal::new(520, 0),
            max_step: Decimal::new(5, 1), // 0.5
            order_probability: 0.9,
            taker_probability: 0.6,
            cancel_probability: 0.2,
            min_fraction: Decimal::new(1, 2), // 1%
            max_fraction: Decimal::new(5, 2), // 5%
            seed_base: Decimal::new(10_000, 0),
            seed_quote: Decimal::new(5_000_000, 0),
        }
    }
}
