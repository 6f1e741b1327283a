//! The advertisement book.
//!
//! Posting an ad moves no funds. Liquidity accounting happens when deals
//! open and close: [`AdBook::take`] carves crypto out of `ad.available`,
//! [`AdBook::restore`] puts it back. Both are crate-private so the only
//! path to them runs through the desk, which pairs every take with an
//! escrow reservation.

use std::collections::HashMap;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tengex_types::{Ad, AdId, AdSide, Asset, Result, TengexError, UserId};

/// Everything a user supplies when posting an ad.
///
/// `limit_min` / `limit_max` bound the fiat notional of a single deal;
/// the defaults from [`AdRequest::sell`] accept any size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdRequest {
    pub user_id: UserId,
    pub side: AdSide,
    pub currency: Asset,
    /// Fiat price per unit of `currency`.
    pub price: Decimal,
    /// Crypto liquidity on offer.
    pub available: Decimal,
    pub limit_min: Decimal,
    pub limit_max: Decimal,
    pub payment_methods: Vec<String>,
    pub requisites: Option<String>,
}

impl AdRequest {
    /// A sell-side ad with open deal limits.
    #[must_use]
    pub fn sell(
        user_id: UserId,
        currency: impl Into<Asset>,
        price: Decimal,
        available: Decimal,
    ) -> Self {
        Self {
            user_id,
            side: AdSide::Sell,
            currency: currency.into(),
            price,
            available,
            limit_min: Decimal::ZERO,
            limit_max: Decimal::MAX,
            payment_methods: Vec::new(),
            requisites: None,
        }
    }

    /// A buy-side ad with open deal limits.
    #[must_use]
    pub fn buy(
        user_id: UserId,
        currency: impl Into<Asset>,
        price: Decimal,
        available: Decimal,
    ) -> Self {
        Self {
            side: AdSide::Buy,
            ..Self::sell(user_id, currency, price, available)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.currency.is_empty() {
            return Err(TengexError::invalid_input("ad currency must not be empty"));
        }
        if self.price <= Decimal::ZERO {
            return Err(TengexError::invalid_input("ad price must be positive"));
        }
        if self.available <= Decimal::ZERO {
            return Err(TengexError::invalid_input(
                "ad must offer positive liquidity",
            ));
        }
        if self.limit_min < Decimal::ZERO {
            return Err(TengexError::invalid_input(
                "deal limits must not be negative",
            ));
        }
        if self.limit_max < self.limit_min {
            return Err(TengexError::invalid_input(
                "maximum deal limit is below the minimum",
            ));
        }
        Ok(())
    }
}

/// All posted ads, live and deactivated.
#[derive(Debug, Default)]
pub struct AdBook {
    ads: RwLock<HashMap<AdId, Ad>>,
}

impl AdBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a new ad. Returns the stored row.
    pub fn post(&self, request: AdRequest) -> Result<Ad> {
        request.validate()?;
        let now = chrono::Utc::now();
        let ad = Ad {
            id: AdId::new(),
            user_id: request.user_id,
            side: request.side,
            currency: request.currency,
            price: request.price,
            available: request.available,
            limit_min: request.limit_min,
            limit_max: request.limit_max,
            payment_methods: request.payment_methods,
            requisites: request.requisites,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        info!(
            ad = %ad.id,
            user = %ad.user_id,
            side = %ad.side,
            currency = %ad.currency,
            price = %ad.price,
            available = %ad.available,
            "ad posted"
        );
        self.ads.write().insert(ad.id, ad.clone());
        Ok(ad)
    }

    /// Look up one ad.
    pub fn get(&self, id: AdId) -> Result<Ad> {
        self.ads
            .read()
            .get(&id)
            .cloned()
            .ok_or(TengexError::AdNotFound(id))
    }

    /// Activate or deactivate an ad. Only its owner may do this.
    ///
    /// Deactivation stops new deals; deals already open against the ad
    /// run to completion regardless.
    pub fn set_active(&self, id: AdId, actor: UserId, active: bool) -> Result<Ad> {
        let mut ads = self.ads.write();
        let ad = ads.get_mut(&id).ok_or(TengexError::AdNotFound(id))?;
        if ad.user_id != actor {
            return Err(TengexError::forbidden(
                "only the ad's owner may change its status",
            ));
        }
        ad.is_active = active;
        ad.updated_at = chrono::Utc::now();
        info!(ad = %id, active, "ad status changed");
        Ok(ad.clone())
    }

    /// All ads currently accepting deals.
    #[must_use]
    pub fn list_active(&self) -> Vec<Ad> {
        self.ads
            .read()
            .values()
            .filter(|ad| ad.is_active)
            .cloned()
            .collect()
    }

    /// Carve `amount` of crypto out of the ad's liquidity for a new deal.
    ///
    /// Checks that the ad exists, is active, is sell-side, has the
    /// liquidity, and that the deal's fiat notional sits inside the ad's
    /// limits. Returns the ad as it was before the decrement so the
    /// caller can price the deal from a consistent snapshot.
    pub(crate) fn take(&self, id: AdId, amount: Decimal) -> Result<Ad> {
        let mut ads = self.ads.write();
        let ad = ads.get_mut(&id).ok_or(TengexError::AdNotFound(id))?;
        if !ad.is_active {
            return Err(TengexError::AdUnavailable {
                reason: "ad is not active".to_string(),
            });
        }
        if ad.side != AdSide::Sell {
            return Err(TengexError::AdUnavailable {
                reason: "only sell-side ads can serve escrow deals".to_string(),
            });
        }
        if amount > ad.available {
            return Err(TengexError::AdUnavailable {
                reason: format!(
                    "insufficient ad liquidity: need {amount}, have {}",
                    ad.available
                ),
            });
        }
        let fiat_notional = ad.fiat_value(amount);
        if !ad.within_limits(fiat_notional) {
            return Err(TengexError::AdUnavailable {
                reason: format!(
                    "deal size {fiat_notional} outside ad limits [{}, {}]",
                    ad.limit_min, ad.limit_max
                ),
            });
        }
        let snapshot = ad.clone();
        ad.available -= amount;
        ad.updated_at = chrono::Utc::now();
        debug!(ad = %id, amount = %amount, remaining = %ad.available, "ad liquidity taken");
        Ok(snapshot)
    }

    /// Return previously taken liquidity after a cancelled or expired deal.
    ///
    /// Ads are never deleted, so the target always exists; a miss is
    /// logged rather than surfaced because the escrow unwind that
    /// precedes this call must not be rolled back.
    pub(crate) fn restore(&self, id: AdId, amount: Decimal) {
        let mut ads = self.ads.write();
        let Some(ad) = ads.get_mut(&id) else {
            warn!(ad = %id, amount = %amount, "liquidity restore targeted a missing ad");
            return;
        };
        ad.available += amount;
        ad.updated_at = chrono::Utc::now();
        debug!(ad = %id, amount = %amount, available = %ad.available, "ad liquidity restored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn post_validates_the_request() {
        let book = AdBook::new();
        let owner = UserId::new();

        let mut bad_price = AdRequest::sell(owner, "USDT", dec(0), dec(10));
        bad_price.price = dec(-5);
        assert!(matches!(
            book.post(bad_price),
            Err(TengexError::InvalidInput { .. })
        ));

        let no_liquidity = AdRequest::sell(owner, "USDT", dec(500), dec(0));
        assert!(matches!(
            book.post(no_liquidity),
            Err(TengexError::InvalidInput { .. })
        ));

        let mut inverted = AdRequest::sell(owner, "USDT", dec(500), dec(10));
        inverted.limit_min = dec(5000);
        inverted.limit_max = dec(1000);
        assert!(matches!(
            book.post(inverted),
            Err(TengexError::InvalidInput { .. })
        ));

        let ok = book
            .post(AdRequest::sell(owner, "USDT", dec(500), dec(10)))
            .unwrap();
        assert!(ok.is_active);
        assert_eq!(ok.available, dec(10));
        assert_eq!(book.get(ok.id).unwrap().price, dec(500));
    }

    #[test]
    fn set_active_is_owner_only() {
        let book = AdBook::new();
        let owner = UserId::new();
        let ad = book
            .post(AdRequest::sell(owner, "USDT", dec(500), dec(10)))
            .unwrap();

        let err = book.set_active(ad.id, UserId::new(), false).unwrap_err();
        assert!(matches!(err, TengexError::Forbidden { .. }));
        assert!(book.get(ad.id).unwrap().is_active);

        book.set_active(ad.id, owner, false).unwrap();
        assert!(!book.get(ad.id).unwrap().is_active);
        assert!(book.list_active().is_empty());
    }

    #[test]
    fn take_decrements_and_restore_replenishes() {
        let book = AdBook::new();
        let ad = book
            .post(AdRequest::sell(UserId::new(), "USDT", dec(500), dec(10)))
            .unwrap();

        let snapshot = book.take(ad.id, dec(4)).unwrap();
        assert_eq!(snapshot.available, dec(10));
        assert_eq!(book.get(ad.id).unwrap().available, dec(6));

        book.restore(ad.id, dec(4));
        assert_eq!(book.get(ad.id).unwrap().available, dec(10));
    }

    #[test]
    fn take_rejects_inactive_buy_side_and_overdraw() {
        let book = AdBook::new();
        let owner = UserId::new();

        let buy = book
            .post(AdRequest::buy(owner, "USDT", dec(500), dec(10)))
            .unwrap();
        assert!(matches!(
            book.take(buy.id, dec(1)),
            Err(TengexError::AdUnavailable { .. })
        ));

        let sell = book
            .post(AdRequest::sell(owner, "USDT", dec(500), dec(10)))
            .unwrap();
        assert!(matches!(
            book.take(sell.id, dec(11)),
            Err(TengexError::AdUnavailable { .. })
        ));

        book.set_active(sell.id, owner, false).unwrap();
        assert!(matches!(
            book.take(sell.id, dec(1)),
            Err(TengexError::AdUnavailable { .. })
        ));
        // Nothing was taken along the way.
        assert_eq!(book.get(sell.id).unwrap().available, dec(10));

        assert!(matches!(
            book.take(AdId::new(), dec(1)),
            Err(TengexError::AdNotFound(_))
        ));
    }

    #[test]
    fn take_enforces_fiat_deal_limits() {
        let book = AdBook::new();
        let mut request = AdRequest::sell(UserId::new(), "USDT", dec(500), dec(100));
        request.limit_min = dec(1000);
        request.limit_max = dec(5000);
        let ad = book.post(request).unwrap();

        // 1 USDT x 500 = 500 KZT, below the 1000 floor.
        assert!(matches!(
            book.take(ad.id, dec(1)),
            Err(TengexError::AdUnavailable { .. })
        ));
        // 20 USDT x 500 = 10000 KZT, above the 5000 cap.
        assert!(matches!(
            book.take(ad.id, dec(20)),
            Err(TengexError::AdUnavailable { .. })
        ));
        // Boundaries are inclusive.
        book.take(ad.id, dec(2)).unwrap();
        book.take(ad.id, dec(10)).unwrap();
        assert_eq!(book.get(ad.id).unwrap().available, dec(88));
    }
}
