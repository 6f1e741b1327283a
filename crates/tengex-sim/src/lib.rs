//! # Tengex Sim
//!
//! Synthetic liquidity for quiet markets. A [`simulator::MarketSimulator`]
//! owns a pool of marker accounts and trades through the public
//! [`tengex_spot::SpotEngine`] API on a seeded random walk; it holds no
//! privileges the accounts themselves do not have, so every simulator
//! trade obeys the same funding, fee and conservation rules as a real one.

pub mod simulator;

pub use simulator::{MarketSimulator, SyntheticTrader};
