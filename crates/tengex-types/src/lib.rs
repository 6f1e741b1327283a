//! # tengex-types
//!
//! Shared types, errors, and configuration for the **Tengex** exchange core.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`UserId`], [`TradeId`], [`DealId`], [`AdId`], [`MarketPair`]
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderType`], [`OrderStatus`]
//! - **Trade model**: [`Trade`], [`Fill`], [`FillRole`]
//! - **Balance model**: [`BalanceEntry`], [`Asset`]
//! - **Market model**: [`MarketStats`]
//! - **P2P model**: [`Ad`], [`AdSide`], [`Deal`], [`DealState`], [`DisputeResolution`]
//! - **Events**: [`DealEvent`], [`DealEventKind`]
//! - **Configuration**: [`FeeSchedule`], [`MarketConfig`], [`DealConfig`], [`SimulatorConfig`]
//! - **Errors**: [`TengexError`] with `TGX_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod ad;
pub mod balance;
pub mod config;
pub mod constants;
pub mod deal;
pub mod error;
pub mod event;
pub mod ids;
pub mod market;
pub mod order;
pub mod trade;

// Re-export all primary types at crate root for ergonomic imports:
//   use tengex_types::{Order, OrderSide, Deal, DealState, ...};

pub use ad::*;
pub use balance::*;
pub use config::*;
pub use deal::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use market::*;
pub use order::*;
pub use trade::*;

// Constants are accessed via `tengex_types::constants::FOO`
// (not re-exported to avoid name collisions).
