//! Supply conservation bookkeeping.
//!
//! The [`Conservation`] tracker mirrors every ledger mutation as a delta on
//! the expected total supply per currency. Internal transfers net to zero;
//! external inflows (deposits, fiat credits), admin adjustments and the
//! in-kind fee haircuts of trade settlement shift it. The ledger's audit
//! compares actual balance sums against these expectations, so any mutation
//! path that forgets its mirror shows up as a violation.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tengex_types::Asset;

/// Expected-supply tracker, one counter per currency, plus a cumulative
/// fee counter for reporting.
#[derive(Debug, Default)]
pub struct Conservation {
    expected: Mutex<HashMap<Asset, Decimal>>,
    fees: Mutex<HashMap<Asset, Decimal>>,
}

impl Conservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Funds entered the system from outside (deposit, out-of-band fiat).
    pub fn record_inflow(&self, asset: &str, amount: Decimal) {
        *self
            .expected
            .lock()
            .entry(asset.to_string())
            .or_default() += amount;
    }

    /// Funds left the system (negative admin delta, fee haircut).
    pub fn record_outflow(&self, asset: &str, amount: Decimal) {
        *self
            .expected
            .lock()
            .entry(asset.to_string())
            .or_default() -= amount;
    }

    /// A cross-currency settlement: `amount` of `from_asset` left, and
    /// `converted` of `to_asset` arrived. Same-currency settlements net the
    /// fee haircut automatically.
    pub fn record_conversion(
        &self,
        from_asset: &str,
        amount: Decimal,
        to_asset: &str,
        converted: Decimal,
    ) {
        let mut expected = self.expected.lock();
        *expected.entry(from_asset.to_string()).or_default() -= amount;
        *expected.entry(to_asset.to_string()).or_default() += converted;
    }

    /// Report a collected fee, for observability only. Fees already shrink
    /// the expected supply through the settlement that charged them.
    pub fn record_fee(&self, asset: &str, amount: Decimal) {
        *self.fees.lock().entry(asset.to_string()).or_default() += amount;
    }

    /// The supply this currency should currently have.
    #[must_use]
    pub fn expected_supply(&self, asset: &str) -> Decimal {
        self.expected
            .lock()
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Cumulative reported fees for this currency.
    #[must_use]
    pub fn fees_collected(&self, asset: &str) -> Decimal {
        self.fees
            .lock()
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}
