//! # Tengex P2P
//!
//! The peer-to-peer trading desk: users post fiat-priced sell ads, buyers
//! open deals against them, and the desk escrows the seller's crypto in
//! the ledger until the fiat payment is confirmed or the deal dies.
//!
//! Layers:
//! 1. [`ads::AdBook`]: posted advertisements and their remaining liquidity.
//! 2. [`desk::P2pDesk`]: the deal state machine, escrow choreography,
//!    deadline expiry, disputes and role checks.
//!
//! All fund movement goes through [`tengex_ledger::Ledger`]; the desk
//! never touches balances directly.

pub mod ads;
pub mod desk;

pub use ads::{AdBook, AdRequest};
pub use desk::P2pDesk;
