//! The balance ledger: sharded, atomic per-(user, currency) accounting.
//!
//! Every fund movement in the system goes through this type. Rows live in a
//! fixed set of shards; an operation locks only the shards of the rows it
//! touches, so traffic on unrelated (user, currency) pairs never contends.
//! Multi-row operations acquire their shards in ascending index order, which
//! rules out lock cycles.
//!
//! Validation always precedes mutation: an operation either applies fully
//! or leaves every row unchanged.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use tengex_types::{constants, Asset, BalanceEntry, Result, TengexError, UserId};
use tracing::{debug, info, warn};

use crate::Conservation;

type Shard = HashMap<(UserId, Asset), BalanceEntry>;

/// Settlement instruction for one matched trade.
///
/// Amounts are what each side's locked balance surrenders; credits are what
/// the opposite side receives after its fee haircut. The difference is the
/// in-kind fee the platform keeps.
#[derive(Debug, Clone)]
pub struct TradeSettlement {
    pub buyer: UserId,
    pub seller: UserId,
    pub base: Asset,
    pub quote: Asset,
    /// Base quantity consumed from the seller's locked balance.
    pub base_amount: Decimal,
    /// Quote notional consumed from the buyer's locked balance.
    pub quote_amount: Decimal,
    /// Base credited to the buyer.
    pub buyer_credit: Decimal,
    /// Quote credited to the seller.
    pub seller_credit: Decimal,
}

/// The single balance-mutation authority.
///
/// Shared via `Arc` and injected into the matching engine and the P2P desk;
/// neither of them ever touches a balance row directly.
#[derive(Debug)]
pub struct Ledger {
    shards: Vec<Mutex<Shard>>,
    conservation: Conservation,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..constants::LEDGER_SHARDS)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
            conservation: Conservation::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn shard_index(&self, user: UserId, asset: &str) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        user.hash(&mut hasher);
        asset.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn ensure_positive(amount: Decimal, what: &str) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(TengexError::invalid_input(format!(
                "{what} must be positive, got {amount}"
            )));
        }
        Ok(())
    }

    /// Remove `amount` from a row's locked balance, strictly.
    fn take_locked(shard: &mut Shard, key: &(UserId, Asset), amount: Decimal) -> Result<()> {
        let entry = shard.get_mut(key).ok_or(TengexError::InsufficientLocked {
            needed: amount,
            locked: Decimal::ZERO,
        })?;
        if entry.locked < amount {
            return Err(TengexError::InsufficientLocked {
                needed: amount,
                locked: entry.locked,
            });
        }
        entry.locked -= amount;
        Ok(())
    }

    fn guard_for<'a>(guards: &'a mut [(usize, MutexGuard<'_, Shard>)], shard: usize) -> &'a mut Shard {
        guards
            .iter_mut()
            .find(|(idx, _)| *idx == shard)
            .map(|(_, guard)| &mut **guard)
            .expect("guard is held for every involved shard")
    }

    // =================================================================
    // External inflows
    // =================================================================

    /// Credit a user's available balance (deposit / external inflow).
    /// Creates the row if it does not exist.
    ///
    /// # Errors
    /// `InvalidInput` if `amount` is not positive.
    pub fn credit(&self, user: UserId, asset: &str, amount: Decimal) -> Result<()> {
        Self::ensure_positive(amount, "credit amount")?;
        let mut shard = self.shards[self.shard_index(user, asset)].lock();
        shard
            .entry((user, asset.to_string()))
            .or_default()
            .available += amount;
        self.conservation.record_inflow(asset, amount);
        debug!(user = %user, asset, amount = %amount, "credited");
        Ok(())
    }

    // =================================================================
    // Reservations
    // =================================================================

    /// Move funds from available to locked.
    ///
    /// # Errors
    /// `InsufficientFunds` if the available balance is short; the row is
    /// left unchanged.
    pub fn reserve(&self, user: UserId, asset: &str, amount: Decimal) -> Result<()> {
        Self::ensure_positive(amount, "reserve amount")?;
        let mut shard = self.shards[self.shard_index(user, asset)].lock();
        let entry = shard.get_mut(&(user, asset.to_string())).ok_or(
            TengexError::InsufficientFunds {
                needed: amount,
                available: Decimal::ZERO,
            },
        )?;
        if entry.available < amount {
            return Err(TengexError::InsufficientFunds {
                needed: amount,
                available: entry.available,
            });
        }
        entry.available -= amount;
        entry.locked += amount;
        debug!(user = %user, asset, amount = %amount, "reserved");
        Ok(())
    }

    /// Move funds from locked back to available.
    ///
    /// A request exceeding the locked balance moves what is there and
    /// discards the excess: locked floors at zero and never errors. The
    /// clamp is logged when it bites.
    ///
    /// # Errors
    /// `InvalidInput` if `amount` is not positive.
    pub fn release(&self, user: UserId, asset: &str, amount: Decimal) -> Result<()> {
        Self::ensure_positive(amount, "release amount")?;
        let mut shard = self.shards[self.shard_index(user, asset)].lock();
        let entry = shard.entry((user, asset.to_string())).or_default();
        let moved = entry.locked.min(amount);
        if moved < amount {
            warn!(
                user = %user,
                asset,
                requested = %amount,
                locked = %entry.locked,
                "release clamped at locked floor"
            );
        }
        entry.locked -= moved;
        entry.available += moved;
        debug!(user = %user, asset, amount = %moved, "released");
        Ok(())
    }

    // =================================================================
    // Settlement
    // =================================================================

    /// Settle locked funds to another user, possibly in another currency.
    ///
    /// Decrements `from`'s locked `from_asset` by `amount` and credits
    /// `to`'s available `to_asset` with `converted`, atomically. The fee
    /// haircut of a trade leg is simply `amount - converted`.
    ///
    /// # Errors
    /// `InsufficientLocked` if `from` has less than `amount` locked;
    /// nothing moves in that case.
    pub fn settle_locked_to(
        &self,
        from: UserId,
        from_asset: &str,
        amount: Decimal,
        to: UserId,
        to_asset: &str,
        converted: Decimal,
    ) -> Result<()> {
        Self::ensure_positive(amount, "settle amount")?;
        if converted < Decimal::ZERO {
            return Err(TengexError::invalid_input(format!(
                "converted amount must not be negative, got {converted}"
            )));
        }
        let from_key = (from, from_asset.to_string());
        let to_key = (to, to_asset.to_string());
        let from_idx = self.shard_index(from, from_asset);
        let to_idx = self.shard_index(to, to_asset);

        if from_idx == to_idx {
            let mut shard = self.shards[from_idx].lock();
            Self::take_locked(&mut shard, &from_key, amount)?;
            shard.entry(to_key).or_default().available += converted;
            self.conservation
                .record_conversion(from_asset, amount, to_asset, converted);
        } else {
            // Ascending index order keeps multi-shard acquisition cycle-free.
            let low = self.shards[from_idx.min(to_idx)].lock();
            let high = self.shards[from_idx.max(to_idx)].lock();
            let (mut from_shard, mut to_shard) = if from_idx < to_idx {
                (low, high)
            } else {
                (high, low)
            };
            Self::take_locked(&mut from_shard, &from_key, amount)?;
            to_shard.entry(to_key).or_default().available += converted;
            self.conservation
                .record_conversion(from_asset, amount, to_asset, converted);
        }
        debug!(
            from = %from,
            to = %to,
            from_asset,
            amount = %amount,
            to_asset,
            converted = %converted,
            "settled locked funds"
        );
        Ok(())
    }

    /// Settle one matched trade: both legs in one atomic unit.
    ///
    /// The seller's locked base and the buyer's locked quote are consumed in
    /// full; the buyer is credited base and the seller quote, each after its
    /// fee haircut. Both locked balances are validated before any row moves.
    ///
    /// # Errors
    /// `InsufficientLocked` if either side's locked balance is short;
    /// `InvalidInput` if an amount is not positive or a credit exceeds the
    /// amount it settles.
    pub fn settle_trade(&self, settlement: &TradeSettlement) -> Result<()> {
        let TradeSettlement {
            buyer,
            seller,
            ref base,
            ref quote,
            base_amount,
            quote_amount,
            buyer_credit,
            seller_credit,
        } = *settlement;
        Self::ensure_positive(base_amount, "trade base amount")?;
        Self::ensure_positive(quote_amount, "trade quote amount")?;
        if buyer_credit < Decimal::ZERO || buyer_credit > base_amount {
            return Err(TengexError::invalid_input(format!(
                "buyer credit {buyer_credit} out of range for base amount {base_amount}"
            )));
        }
        if seller_credit < Decimal::ZERO || seller_credit > quote_amount {
            return Err(TengexError::invalid_input(format!(
                "seller credit {seller_credit} out of range for quote amount {quote_amount}"
            )));
        }

        let seller_base_key = (seller, base.clone());
        let buyer_quote_key = (buyer, quote.clone());
        let seller_base_idx = self.shard_index(seller, base);
        let buyer_base_idx = self.shard_index(buyer, base);
        let buyer_quote_idx = self.shard_index(buyer, quote);
        let seller_quote_idx = self.shard_index(seller, quote);

        let mut order = vec![
            seller_base_idx,
            buyer_base_idx,
            buyer_quote_idx,
            seller_quote_idx,
        ];
        order.sort_unstable();
        order.dedup();
        let mut guards: Vec<(usize, MutexGuard<'_, Shard>)> = order
            .iter()
            .map(|&idx| (idx, self.shards[idx].lock()))
            .collect();

        // Validate both legs before touching any row.
        for (idx, key, needed) in [
            (seller_base_idx, &seller_base_key, base_amount),
            (buyer_quote_idx, &buyer_quote_key, quote_amount),
        ] {
            let shard = Self::guard_for(&mut guards, idx);
            let locked = shard.get(key).map_or(Decimal::ZERO, |e| e.locked);
            if locked < needed {
                return Err(TengexError::InsufficientLocked { needed, locked });
            }
        }

        Self::take_locked(
            Self::guard_for(&mut guards, seller_base_idx),
            &seller_base_key,
            base_amount,
        )?;
        Self::guard_for(&mut guards, buyer_base_idx)
            .entry((buyer, base.clone()))
            .or_default()
            .available += buyer_credit;
        Self::take_locked(
            Self::guard_for(&mut guards, buyer_quote_idx),
            &buyer_quote_key,
            quote_amount,
        )?;
        Self::guard_for(&mut guards, seller_quote_idx)
            .entry((seller, quote.clone()))
            .or_default()
            .available += seller_credit;

        self.conservation
            .record_conversion(base, base_amount, base, buyer_credit);
        self.conservation
            .record_conversion(quote, quote_amount, quote, seller_credit);
        debug!(
            buyer = %buyer,
            seller = %seller,
            base = %base,
            quote = %quote,
            base_amount = %base_amount,
            quote_amount = %quote_amount,
            "trade settled"
        );
        Ok(())
    }

    /// Deliver a deal's escrow: the buyer receives the full crypto `amount`,
    /// the seller receives `fiat_amount` of `fiat`, and the seller's locked
    /// crypto shrinks by `amount` (floor-clamped at zero). One atomic unit
    /// across all three rows.
    ///
    /// The fiat leg is an external inflow: the buyer paid it out of band.
    ///
    /// # Errors
    /// `InvalidInput` if either amount is not positive.
    pub fn deliver_escrow(
        &self,
        seller: UserId,
        currency: &str,
        amount: Decimal,
        buyer: UserId,
        fiat: &str,
        fiat_amount: Decimal,
    ) -> Result<()> {
        Self::ensure_positive(amount, "escrow amount")?;
        Self::ensure_positive(fiat_amount, "escrow fiat amount")?;
        let seller_idx = self.shard_index(seller, currency);
        let buyer_idx = self.shard_index(buyer, currency);
        let fiat_idx = self.shard_index(seller, fiat);

        let mut order = vec![seller_idx, buyer_idx, fiat_idx];
        order.sort_unstable();
        order.dedup();
        let mut guards: Vec<(usize, MutexGuard<'_, Shard>)> = order
            .iter()
            .map(|&idx| (idx, self.shards[idx].lock()))
            .collect();

        let minted = {
            let shard = Self::guard_for(&mut guards, seller_idx);
            let entry = shard.entry((seller, currency.to_string())).or_default();
            let consumed = entry.locked.min(amount);
            entry.locked -= consumed;
            amount - consumed
        };
        if !minted.is_zero() {
            warn!(
                seller = %seller,
                currency,
                excess = %minted,
                "escrow delivery exceeded locked balance, clamped at zero"
            );
            self.conservation.record_inflow(currency, minted);
        }
        Self::guard_for(&mut guards, buyer_idx)
            .entry((buyer, currency.to_string()))
            .or_default()
            .available += amount;
        Self::guard_for(&mut guards, fiat_idx)
            .entry((seller, fiat.to_string()))
            .or_default()
            .available += fiat_amount;
        self.conservation.record_inflow(fiat, fiat_amount);
        info!(
            seller = %seller,
            buyer = %buyer,
            currency,
            amount = %amount,
            fiat,
            fiat_amount = %fiat_amount,
            "escrow delivered"
        );
        Ok(())
    }

    // =================================================================
    // Admin operations
    // =================================================================

    /// Apply a signed delta to a user's available balance.
    ///
    /// # Errors
    /// `InvalidInput` for a zero delta; `InsufficientFunds` if a negative
    /// delta would push available below zero.
    pub fn credit_delta(&self, user: UserId, asset: &str, delta: Decimal) -> Result<()> {
        if delta.is_zero() {
            return Err(TengexError::invalid_input("delta must be non-zero"));
        }
        let mut shard = self.shards[self.shard_index(user, asset)].lock();
        let entry = shard.entry((user, asset.to_string())).or_default();
        let new_available = entry.available + delta;
        if new_available < Decimal::ZERO {
            return Err(TengexError::InsufficientFunds {
                needed: -delta,
                available: entry.available,
            });
        }
        entry.available = new_available;
        if delta > Decimal::ZERO {
            self.conservation.record_inflow(asset, delta);
        } else {
            self.conservation.record_outflow(asset, -delta);
        }
        info!(user = %user, asset, delta = %delta, "admin balance delta applied");
        Ok(())
    }

    /// Overwrite a user's balance row outright.
    ///
    /// # Errors
    /// `InvalidInput` if either component is negative.
    pub fn set_absolute(
        &self,
        user: UserId,
        asset: &str,
        available: Decimal,
        locked: Decimal,
    ) -> Result<()> {
        if available < Decimal::ZERO || locked < Decimal::ZERO {
            return Err(TengexError::invalid_input(
                "absolute balances must not be negative",
            ));
        }
        let mut shard = self.shards[self.shard_index(user, asset)].lock();
        let entry = shard.entry((user, asset.to_string())).or_default();
        let old_total = entry.total();
        entry.available = available;
        entry.locked = locked;
        let diff = available + locked - old_total;
        if diff > Decimal::ZERO {
            self.conservation.record_inflow(asset, diff);
        } else if diff < Decimal::ZERO {
            self.conservation.record_outflow(asset, -diff);
        }
        info!(
            user = %user,
            asset,
            available = %available,
            locked = %locked,
            "admin balance overwrite applied"
        );
        Ok(())
    }

    // =================================================================
    // Reads and audit
    // =================================================================

    /// The balance for a (user, currency) pair. Missing rows read as zero.
    #[must_use]
    pub fn balance(&self, user: UserId, asset: &str) -> BalanceEntry {
        self.shards[self.shard_index(user, asset)]
            .lock()
            .get(&(user, asset.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Total supply of a currency (sum of all users' available + locked).
    #[must_use]
    pub fn total_supply(&self, asset: &str) -> Decimal {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .iter()
                    .filter(|((_, a), _)| a == asset)
                    .map(|(_, entry)| entry.total())
                    .sum::<Decimal>()
            })
            .sum()
    }

    /// Report a collected fee for observability (no balance effect).
    pub fn record_fee(&self, asset: &str, amount: Decimal) {
        self.conservation.record_fee(asset, amount);
    }

    /// Cumulative fees reported for a currency.
    #[must_use]
    pub fn fees_collected(&self, asset: &str) -> Decimal {
        self.conservation.fees_collected(asset)
    }

    /// Audit one currency: the sum of all rows must equal the expected
    /// supply tracked across every mutation. Holds all shards for an exact
    /// snapshot.
    ///
    /// # Errors
    /// `ConservationViolation` naming the currency and both values.
    pub fn verify_conservation(&self, asset: &str) -> Result<()> {
        let guards: Vec<MutexGuard<'_, Shard>> =
            self.shards.iter().map(parking_lot::Mutex::lock).collect();
        let actual: Decimal = guards
            .iter()
            .flat_map(|shard| shard.iter())
            .filter(|((_, a), _)| a == asset)
            .map(|(_, entry)| entry.total())
            .sum();
        let expected = self.conservation.expected_supply(asset);
        if actual != expected {
            return Err(TengexError::ConservationViolation {
                reason: format!("{asset}: actual supply {actual} != expected {expected}"),
            });
        }
        Ok(())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn credit_increases_available() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger.credit(user, "USDT", dec(1000)).unwrap();
        let bal = ledger.balance(user, "USDT");
        assert_eq!(bal.available, dec(1000));
        assert_eq!(bal.locked, Decimal::ZERO);
    }

    #[test]
    fn credit_rejects_non_positive() {
        let ledger = Ledger::new();
        let user = UserId::new();
        let err = ledger.credit(user, "USDT", Decimal::ZERO).unwrap_err();
        assert!(matches!(err, TengexError::InvalidInput { .. }));
        let err = ledger.credit(user, "USDT", dec(-5)).unwrap_err();
        assert!(matches!(err, TengexError::InvalidInput { .. }));
    }

    #[test]
    fn reserve_moves_to_locked() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger.credit(user, "USDT", dec(1000)).unwrap();
        ledger.reserve(user, "USDT", dec(400)).unwrap();
        let bal = ledger.balance(user, "USDT");
        assert_eq!(bal.available, dec(600));
        assert_eq!(bal.locked, dec(400));
    }

    #[test]
    fn reserve_insufficient_fails_unchanged() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger.credit(user, "USDT", dec(100)).unwrap();
        let err = ledger.reserve(user, "USDT", dec(200)).unwrap_err();
        assert!(matches!(err, TengexError::InsufficientFunds { .. }));
        let bal = ledger.balance(user, "USDT");
        assert_eq!(bal.available, dec(100));
        assert_eq!(bal.locked, Decimal::ZERO);
    }

    #[test]
    fn reserve_missing_row_fails() {
        let ledger = Ledger::new();
        let err = ledger.reserve(UserId::new(), "BTC", dec(1)).unwrap_err();
        assert!(
            matches!(err, TengexError::InsufficientFunds { available, .. } if available.is_zero())
        );
    }

    #[test]
    fn release_restores_available() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger.credit(user, "USDT", dec(1000)).unwrap();
        ledger.reserve(user, "USDT", dec(400)).unwrap();
        ledger.release(user, "USDT", dec(400)).unwrap();
        let bal = ledger.balance(user, "USDT");
        assert_eq!(bal.available, dec(1000));
        assert_eq!(bal.locked, Decimal::ZERO);
    }

    #[test]
    fn release_clamps_excess_without_minting() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger.credit(user, "USDT", dec(100)).unwrap();
        ledger.reserve(user, "USDT", dec(40)).unwrap();
        // Asking for more than is locked moves only what is there.
        ledger.release(user, "USDT", dec(50)).unwrap();
        let bal = ledger.balance(user, "USDT");
        assert_eq!(bal.available, dec(100));
        assert_eq!(bal.locked, Decimal::ZERO);
        ledger.verify_conservation("USDT").unwrap();
    }

    #[test]
    fn settle_same_currency_applies_haircut() {
        let ledger = Ledger::new();
        let seller = UserId::new();
        let buyer = UserId::new();
        ledger.credit(seller, "BTC", dec(10)).unwrap();
        ledger.reserve(seller, "BTC", dec(1)).unwrap();
        ledger
            .settle_locked_to(seller, "BTC", dec(1), buyer, "BTC", Decimal::new(998, 3))
            .unwrap();
        assert_eq!(ledger.balance(seller, "BTC").locked, Decimal::ZERO);
        assert_eq!(ledger.balance(buyer, "BTC").available, Decimal::new(998, 3));
        ledger.verify_conservation("BTC").unwrap();
    }

    #[test]
    fn settle_cross_currency() {
        let ledger = Ledger::new();
        let from = UserId::new();
        let to = UserId::new();
        ledger.credit(from, "USDT", dec(100)).unwrap();
        ledger.reserve(from, "USDT", dec(40)).unwrap();
        ledger
            .settle_locked_to(from, "USDT", dec(40), to, "KZT", dec(20_000))
            .unwrap();
        assert_eq!(ledger.balance(from, "USDT").available, dec(60));
        assert_eq!(ledger.balance(from, "USDT").locked, Decimal::ZERO);
        assert_eq!(ledger.balance(to, "KZT").available, dec(20_000));
        ledger.verify_conservation("USDT").unwrap();
        ledger.verify_conservation("KZT").unwrap();
    }

    #[test]
    fn settle_insufficient_locked_fails_unchanged() {
        let ledger = Ledger::new();
        let from = UserId::new();
        let to = UserId::new();
        ledger.credit(from, "USDT", dec(100)).unwrap();
        ledger.reserve(from, "USDT", dec(10)).unwrap();
        let err = ledger
            .settle_locked_to(from, "USDT", dec(20), to, "USDT", dec(20))
            .unwrap_err();
        assert!(matches!(err, TengexError::InsufficientLocked { .. }));
        assert_eq!(ledger.balance(from, "USDT").locked, dec(10));
        assert!(ledger.balance(to, "USDT").is_zero());
    }

    #[test]
    fn settle_trade_moves_both_legs() {
        let ledger = Ledger::new();
        let buyer = UserId::new();
        let seller = UserId::new();
        ledger.credit(buyer, "USDT", dec(100)).unwrap();
        ledger.credit(seller, "BTC", dec(1)).unwrap();
        ledger.reserve(buyer, "USDT", dec(100)).unwrap();
        ledger.reserve(seller, "BTC", dec(1)).unwrap();

        // 1 BTC at 100 USDT: taker buyer keeps 0.998, maker seller keeps 99.9.
        ledger
            .settle_trade(&TradeSettlement {
                buyer,
                seller,
                base: "BTC".to_string(),
                quote: "USDT".to_string(),
                base_amount: dec(1),
                quote_amount: dec(100),
                buyer_credit: Decimal::new(998, 3),
                seller_credit: Decimal::new(999, 1),
            })
            .unwrap();

        assert_eq!(ledger.balance(buyer, "BTC").available, Decimal::new(998, 3));
        assert!(ledger.balance(buyer, "USDT").is_zero());
        assert_eq!(
            ledger.balance(seller, "USDT").available,
            Decimal::new(999, 1)
        );
        assert!(ledger.balance(seller, "BTC").is_zero());
        ledger.verify_conservation("BTC").unwrap();
        ledger.verify_conservation("USDT").unwrap();
    }

    #[test]
    fn settle_trade_short_leg_leaves_rows_unchanged() {
        let ledger = Ledger::new();
        let buyer = UserId::new();
        let seller = UserId::new();
        ledger.credit(buyer, "USDT", dec(50)).unwrap();
        ledger.credit(seller, "BTC", dec(1)).unwrap();
        ledger.reserve(buyer, "USDT", dec(50)).unwrap();
        ledger.reserve(seller, "BTC", dec(1)).unwrap();

        // Buyer's locked quote covers only half the notional.
        let err = ledger
            .settle_trade(&TradeSettlement {
                buyer,
                seller,
                base: "BTC".to_string(),
                quote: "USDT".to_string(),
                base_amount: dec(1),
                quote_amount: dec(100),
                buyer_credit: dec(1),
                seller_credit: dec(100),
            })
            .unwrap_err();

        assert!(matches!(err, TengexError::InsufficientLocked { .. }));
        assert_eq!(ledger.balance(seller, "BTC").locked, dec(1));
        assert_eq!(ledger.balance(buyer, "USDT").locked, dec(50));
        assert!(ledger.balance(buyer, "BTC").is_zero());
    }

    #[test]
    fn settle_trade_rejects_credit_above_amount() {
        let ledger = Ledger::new();
        let err = ledger
            .settle_trade(&TradeSettlement {
                buyer: UserId::new(),
                seller: UserId::new(),
                base: "BTC".to_string(),
                quote: "USDT".to_string(),
                base_amount: dec(1),
                quote_amount: dec(100),
                buyer_credit: dec(2),
                seller_credit: dec(100),
            })
            .unwrap_err();
        assert!(matches!(err, TengexError::InvalidInput { .. }));
    }

    #[test]
    fn deliver_escrow_moves_three_rows() {
        let ledger = Ledger::new();
        let seller = UserId::new();
        let buyer = UserId::new();
        ledger.credit(seller, "USDT", dec(10)).unwrap();
        ledger.reserve(seller, "USDT", dec(4)).unwrap();
        ledger
            .deliver_escrow(seller, "USDT", dec(4), buyer, "KZT", dec(2000))
            .unwrap();
        assert_eq!(ledger.balance(seller, "USDT").available, dec(6));
        assert_eq!(ledger.balance(seller, "USDT").locked, Decimal::ZERO);
        assert_eq!(ledger.balance(seller, "KZT").available, dec(2000));
        assert_eq!(ledger.balance(buyer, "USDT").available, dec(4));
        ledger.verify_conservation("USDT").unwrap();
        ledger.verify_conservation("KZT").unwrap();
    }

    #[test]
    fn deliver_escrow_clamps_locked_floor() {
        let ledger = Ledger::new();
        let seller = UserId::new();
        let buyer = UserId::new();
        ledger.credit(seller, "USDT", dec(2)).unwrap();
        ledger.reserve(seller, "USDT", dec(2)).unwrap();
        // Delivery of 4 against only 2 locked: buyer still receives 4.
        ledger
            .deliver_escrow(seller, "USDT", dec(4), buyer, "KZT", dec(2000))
            .unwrap();
        assert_eq!(ledger.balance(seller, "USDT").locked, Decimal::ZERO);
        assert_eq!(ledger.balance(buyer, "USDT").available, dec(4));
        ledger.verify_conservation("USDT").unwrap();
    }

    #[test]
    fn credit_delta_signed() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger.credit_delta(user, "USDT", dec(100)).unwrap();
        ledger.credit_delta(user, "USDT", dec(-30)).unwrap();
        assert_eq!(ledger.balance(user, "USDT").available, dec(70));
        ledger.verify_conservation("USDT").unwrap();
    }

    #[test]
    fn credit_delta_cannot_go_negative() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger.credit_delta(user, "USDT", dec(10)).unwrap();
        let err = ledger.credit_delta(user, "USDT", dec(-20)).unwrap_err();
        assert!(matches!(err, TengexError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance(user, "USDT").available, dec(10));
    }

    #[test]
    fn credit_delta_rejects_zero() {
        let ledger = Ledger::new();
        let err = ledger
            .credit_delta(UserId::new(), "USDT", Decimal::ZERO)
            .unwrap_err();
        assert!(matches!(err, TengexError::InvalidInput { .. }));
    }

    #[test]
    fn set_absolute_overwrites() {
        let ledger = Ledger::new();
        let user = UserId::new();
        ledger.credit(user, "USDT", dec(100)).unwrap();
        ledger.set_absolute(user, "USDT", dec(5), dec(7)).unwrap();
        let bal = ledger.balance(user, "USDT");
        assert_eq!(bal.available, dec(5));
        assert_eq!(bal.locked, dec(7));
        ledger.verify_conservation("USDT").unwrap();
    }

    #[test]
    fn set_absolute_rejects_negative() {
        let ledger = Ledger::new();
        let err = ledger
            .set_absolute(UserId::new(), "USDT", dec(-1), Decimal::ZERO)
            .unwrap_err();
        assert!(matches!(err, TengexError::InvalidInput { .. }));
    }

    #[test]
    fn total_supply_sums_all_users() {
        let ledger = Ledger::new();
        let u1 = UserId::new();
        let u2 = UserId::new();
        ledger.credit(u1, "USDT", dec(1000)).unwrap();
        ledger.credit(u2, "USDT", dec(500)).unwrap();
        ledger.reserve(u1, "USDT", dec(300)).unwrap();
        assert_eq!(ledger.total_supply("USDT"), dec(1500));
    }

    #[test]
    fn nonexistent_balance_is_zero() {
        let ledger = Ledger::new();
        assert!(ledger.balance(UserId::new(), "BTC").is_zero());
    }

    #[test]
    fn fee_reporting_is_separate_from_supply() {
        let ledger = Ledger::new();
        ledger.record_fee("USDT", dec(3));
        ledger.record_fee("USDT", dec(2));
        assert_eq!(ledger.fees_collected("USDT"), dec(5));
        ledger.verify_conservation("USDT").unwrap();
    }

    #[test]
    fn concurrent_credits_and_reserves() {
        let ledger = Ledger::new();
        let users: Vec<UserId> = (0..4).map(|_| UserId::new()).collect();
        std::thread::scope(|scope| {
            for &user in &users {
                let ledger = &ledger;
                scope.spawn(move || {
                    for _ in 0..100 {
                        ledger.credit(user, "USDT", dec(2)).unwrap();
                        ledger.reserve(user, "USDT", dec(1)).unwrap();
                    }
                });
            }
        });
        assert_eq!(ledger.total_supply("USDT"), dec(800));
        for user in users {
            let bal = ledger.balance(user, "USDT");
            assert_eq!(bal.available, dec(100));
            assert_eq!(bal.locked, dec(100));
        }
        ledger.verify_conservation("USDT").unwrap();
    }

    #[test]
    fn concurrent_settles_conserve_supply() {
        let ledger = Ledger::new();
        let alice = UserId::new();
        let bob = UserId::new();
        ledger.credit(alice, "USDT", dec(1000)).unwrap();
        ledger.credit(bob, "USDT", dec(1000)).unwrap();
        ledger.reserve(alice, "USDT", dec(500)).unwrap();
        ledger.reserve(bob, "USDT", dec(500)).unwrap();
        std::thread::scope(|scope| {
            let l = &ledger;
            scope.spawn(move || {
                for _ in 0..100 {
                    l.settle_locked_to(alice, "USDT", dec(5), bob, "USDT", dec(5))
                        .unwrap();
                }
            });
            scope.spawn(move || {
                for _ in 0..100 {
                    l.settle_locked_to(bob, "USDT", dec(5), alice, "USDT", dec(5))
                        .unwrap();
                }
            });
        });
        assert_eq!(ledger.total_supply("USDT"), dec(2000));
        ledger.verify_conservation("USDT").unwrap();
    }
}
