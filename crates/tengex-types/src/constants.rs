//! System-wide constants for the Tengex exchange core.

/// Maximum decimal precision for prices (8 decimal places).
pub const PRICE_PRECISION: u32 = 8;

/// Maximum decimal precision for quantities (8 decimal places).
pub const QTY_PRECISION: u32 = 8;

/// Default maker fee, in basis points (0.1%).
pub const DEFAULT_MAKER_FEE_BPS: i64 = 10;

/// Default taker fee, in basis points (0.2%).
pub const DEFAULT_TAKER_FEE_BPS: i64 = 20;

/// Default payment deadline for a P2P deal, in minutes.
pub const DEFAULT_DEAL_DEADLINE_MINUTES: i64 = 15;

/// Minimum accepted deal deadline, in minutes.
pub const MIN_DEAL_DEADLINE_MINUTES: i64 = 1;

/// Maximum accepted deal deadline, in minutes (24 hours).
pub const MAX_DEAL_DEADLINE_MINUTES: i64 = 1440;

/// Number of balance shards in the ledger. Keys hash to a shard; operations
/// on different shards never contend.
pub const LEDGER_SHARDS: usize = 16;

/// Maximum open orders per user per market (default).
pub const DEFAULT_MAX_OPEN_ORDERS_PER_USER: usize = 200;

/// Default number of synthetic participants per simulated market.
pub const DEFAULT_SIM_PARTICIPANTS: usize = 8;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Tengex";
