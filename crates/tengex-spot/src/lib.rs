//! # tengex-spot
//!
//! **Continuous spot matching** for the Tengex exchange core.
//!
//! ## Architecture
//!
//! 1. **PriceLevel**: FIFO queue of resting orders sharing one price
//! 2. **OrderBook**: two sorted sides plus an id index, strict price-time
//!    priority
//! 3. **StopRack**: parked stop orders waiting on their trigger price
//! 4. **SpotEngine**: order entry, matching, settlement through the ledger,
//!    stop triggering and per-market statistics
//!
//! ## Matching rules
//!
//! - Every trade executes at the **resting** order's price
//! - The **maker** is the order with the earlier `created_at`; makers pay
//!   0.1%, takers 0.2% under the default schedule, both against the quote
//!   notional
//! - Limit and stop-limit orders reserve funds at placement; market and
//!   plain stop orders fund each fill as it executes
//! - An unfilled market remainder finishes `Partial` and never rests
//! - Stops convert one-way on trigger (`Stop -> Market`,
//!   `StopLimit -> Limit`) and re-enter matching through the same path as
//!   user-submitted orders

pub mod book;
pub mod engine;
pub mod price_level;
pub mod stops;

pub use book::OrderBook;
pub use engine::{OrderRequest, SpotEngine};
pub use price_level::PriceLevel;
pub use stops::StopRack;
