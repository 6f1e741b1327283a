//! # tengex-ledger
//!
//! **Balance Ledger**: the single balance-mutation authority of the Tengex
//! exchange core.
//!
//! ## Architecture
//!
//! 1. **Ledger**: sharded per-(user, currency) rows with available/locked
//!    accounting; every operation is atomic and validated before mutation
//! 2. **Conservation**: an expected-supply mirror of every mutation, backing
//!    the `verify_conservation` audit
//!
//! ## Fund Flow
//!
//! ```text
//! credit → reserve → settle_trade / settle_locked_to / deliver_escrow
//!             └────→ release (clamped at the locked floor)
//! ```
//!
//! The matching engine and the P2P desk hold the ledger behind an `Arc` and
//! never mutate a balance row themselves. Operations on different
//! (user, currency) pairs proceed in parallel; operations on the same pair
//! serialize on the row's shard.

pub mod conservation;
pub mod ledger;

pub use conservation::Conservation;
pub use ledger::{Ledger, TradeSettlement};
