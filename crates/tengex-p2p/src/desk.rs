//! # P2P escrow desk
//!
//! The desk owns the deal lifecycle end to end: it carves liquidity out of
//! a sell ad, locks the seller's crypto as escrow, walks the deal through
//! the [`DealState`] machine and moves funds exactly once, at whichever
//! terminal state the deal reaches.
//!
//! ## Fund choreography
//!
//! ```text
//!  open      seller.available --amount--> seller.locked    ad.available -= amount
//!  release   seller.locked    --amount--> buyer.available
//!            external fiat    --escrow--> seller.available
//!  cancel /  seller.locked    --amount--> seller.available  ad.available += amount
//!  expiry
//! ```
//!
//! The fiat leg never touches the ledger until release: the buyer pays it
//! out of band, and the core only ever sees the parties' claims about it.
//!
//! ## Concurrency
//!
//! Every deal sits behind its own mutex inside a shared map. An operation
//! locks exactly one deal, then talks to the ledger and the ad book; the
//! map lock is never held across either. The payment deadline is enforced
//! lazily under that same per-deal mutex, at the head of every operation
//! and read, so an overdue `PENDING` deal is unwound by exactly one caller
//! no matter how many race to touch it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::{info, warn};

use tengex_ledger::Ledger;
use tengex_types::{
    AdId, Deal, DealConfig, DealEvent, DealEventKind, DealId, DealState, DisputeResolution, Result,
    TengexError, UserId,
};

use crate::ads::AdBook;

/// The P2P trading desk: ads, deals, escrow and roles.
pub struct P2pDesk {
    ledger: Arc<Ledger>,
    ads: AdBook,
    deals: RwLock<HashMap<DealId, Arc<Mutex<Deal>>>>,
    events: Mutex<Vec<DealEvent>>,
    config: DealConfig,
    /// Support actors may release escrow on any deal; they stand in for
    /// synthetic counterparties that have no human at the keys.
    support: RwLock<HashSet<UserId>>,
    /// Admins resolve disputes and may cancel pending deals.
    admins: RwLock<HashSet<UserId>>,
}

impl P2pDesk {
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, config: DealConfig) -> Self {
        Self {
            ledger,
            ads: AdBook::new(),
            deals: RwLock::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            config,
            support: RwLock::new(HashSet::new()),
            admins: RwLock::new(HashSet::new()),
        }
    }

    /// The desk's advertisement book, for posting and browsing.
    #[must_use]
    pub fn ads(&self) -> &AdBook {
        &self.ads
    }

    pub fn grant_support(&self, user: UserId) {
        self.support.write().insert(user);
        info!(user = %user, "support role granted");
    }

    pub fn grant_admin(&self, user: UserId) {
        self.admins.write().insert(user);
        info!(user = %user, "admin role granted");
    }

    fn is_support(&self, user: UserId) -> bool {
        self.support.read().contains(&user)
    }

    fn is_admin(&self, user: UserId) -> bool {
        self.admins.read().contains(&user)
    }

    // =================================================================
    // Deal lifecycle
    // =================================================================

    /// Open a deal against a sell ad, locking the seller's crypto.
    ///
    /// The escrow fiat amount is `amount x ad.price`, fixed here for the
    /// life of the deal. `deadline_minutes` overrides the configured
    /// payment deadline, clamped to the legal range.
    ///
    /// # Errors
    /// `InvalidInput` for a non-positive amount or a buyer opening
    /// against their own ad; `AdNotFound` / `AdUnavailable` from the ad
    /// book; `InsufficientFunds` if the seller cannot cover the escrow,
    /// in which case the ad's liquidity is restored untouched.
    pub fn open_deal(
        &self,
        ad_id: AdId,
        buyer: UserId,
        amount: Decimal,
        deadline_minutes: Option<i64>,
    ) -> Result<Deal> {
        if amount <= Decimal::ZERO {
            return Err(TengexError::invalid_input("deal amount must be positive"));
        }
        let ad = self.ads.get(ad_id)?;
        if ad.user_id == buyer {
            return Err(TengexError::invalid_input(
                "cannot open a deal against your own ad",
            ));
        }
        // Carve liquidity first. The window where it is taken but the
        // escrow is not yet locked only ever under-reports the ad.
        let ad = self.ads.take(ad_id, amount)?;
        if let Err(err) = self.ledger.reserve(ad.user_id, &ad.currency, amount) {
            self.ads.restore(ad_id, amount);
            return Err(err);
        }

        let now = Utc::now();
        let minutes = self.config.clamped_minutes(deadline_minutes);
        if let Some(requested) = deadline_minutes {
            if requested != minutes {
                warn!(requested, clamped = minutes, "deal deadline out of bounds");
            }
        }
        let deal = Deal {
            id: DealId::new(),
            ad_id,
            buyer_id: buyer,
            seller_id: ad.user_id,
            currency: ad.currency.clone(),
            amount,
            price: ad.price,
            fiat: self.config.fiat.clone(),
            escrow_amount: ad.fiat_value(amount),
            state: DealState::Pending,
            created_at: now,
            updated_at: now,
            deadline_at: now + Duration::minutes(minutes),
        };
        info!(
            deal = %deal.id,
            ad = %ad_id,
            buyer = %buyer,
            seller = %deal.seller_id,
            currency = %deal.currency,
            amount = %amount,
            escrow = %deal.escrow_amount,
            deadline = %deal.deadline_at,
            "deal opened"
        );
        self.push_event(DealEvent::new(deal.id, DealEventKind::Opened, Some(buyer)));
        self.deals
            .write()
            .insert(deal.id, Arc::new(Mutex::new(deal.clone())));
        Ok(deal)
    }

    /// The buyer asserts the fiat payment has been sent.
    ///
    /// # Errors
    /// `Forbidden` unless `actor` is the buyer; `InvalidState` unless the
    /// deal is pending.
    pub fn mark_paid(&self, deal_id: DealId, actor: UserId) -> Result<Deal> {
        let cell = self.deal_cell(deal_id)?;
        let mut deal = cell.lock();
        self.expire_if_due(&mut deal)?;
        if actor != deal.buyer_id {
            return Err(TengexError::forbidden("only the buyer may mark a deal paid"));
        }
        deal.transition_to(DealState::Paid)?;
        info!(deal = %deal.id, buyer = %actor, "deal marked paid");
        self.push_event(DealEvent::new(deal.id, DealEventKind::Paid, Some(actor)));
        Ok(deal.clone())
    }

    /// Release escrow to the buyer and credit the seller the fiat leg.
    ///
    /// # Errors
    /// `Forbidden` unless `actor` is the seller or a support actor;
    /// `InvalidState` unless the deal is paid.
    pub fn release(&self, deal_id: DealId, actor: UserId) -> Result<Deal> {
        let cell = self.deal_cell(deal_id)?;
        let mut deal = cell.lock();
        self.expire_if_due(&mut deal)?;
        if actor != deal.seller_id && !self.is_support(actor) {
            return Err(TengexError::forbidden(
                "only the seller or support may release escrow",
            ));
        }
        if deal.state != DealState::Paid {
            return Err(TengexError::invalid_state(format!(
                "release requires a paid deal, deal {} is {}",
                deal.id, deal.state
            )));
        }
        self.deliver(&mut deal, DealEventKind::Released, Some(actor))?;
        Ok(deal.clone())
    }

    /// Cancel a pending deal, returning escrow to the seller and
    /// liquidity to the ad.
    ///
    /// # Errors
    /// `Forbidden` unless `actor` is a deal party or an admin;
    /// `InvalidState` unless the deal is pending.
    pub fn cancel(&self, deal_id: DealId, actor: UserId) -> Result<Deal> {
        let cell = self.deal_cell(deal_id)?;
        let mut deal = cell.lock();
        self.expire_if_due(&mut deal)?;
        if !deal.is_party(actor) && !self.is_admin(actor) {
            return Err(TengexError::forbidden(
                "only a deal party or an admin may cancel",
            ));
        }
        if deal.state != DealState::Pending {
            return Err(TengexError::invalid_state(format!(
                "cancel requires a pending deal, deal {} is {}",
                deal.id, deal.state
            )));
        }
        self.unwind(&mut deal, DealEventKind::Cancelled, Some(actor))?;
        info!(deal = %deal.id, actor = %actor, "deal cancelled");
        Ok(deal.clone())
    }

    /// A party freezes the deal for an admin ruling.
    ///
    /// # Errors
    /// `Forbidden` unless `actor` is a deal party; `InvalidState` unless
    /// the deal is pending or paid.
    pub fn open_dispute(&self, deal_id: DealId, actor: UserId) -> Result<Deal> {
        let cell = self.deal_cell(deal_id)?;
        let mut deal = cell.lock();
        self.expire_if_due(&mut deal)?;
        if !deal.is_party(actor) {
            return Err(TengexError::forbidden("only a deal party may open a dispute"));
        }
        deal.transition_to(DealState::Disputed)?;
        info!(deal = %deal.id, actor = %actor, "dispute opened");
        self.push_event(DealEvent::new(
            deal.id,
            DealEventKind::Disputed,
            Some(actor),
        ));
        Ok(deal.clone())
    }

    /// An admin rules on a disputed deal.
    ///
    /// A ruling for the buyer delivers escrow as if the seller had
    /// released; a ruling for the seller returns it as if the deal had
    /// been cancelled.
    ///
    /// # Errors
    /// `Forbidden` unless `actor` is an admin; `InvalidState` unless the
    /// deal is disputed.
    pub fn resolve_dispute(
        &self,
        deal_id: DealId,
        actor: UserId,
        resolution: DisputeResolution,
    ) -> Result<Deal> {
        let cell = self.deal_cell(deal_id)?;
        let mut deal = cell.lock();
        self.expire_if_due(&mut deal)?;
        if !self.is_admin(actor) {
            return Err(TengexError::forbidden("only an admin may resolve a dispute"));
        }
        if deal.state != DealState::Disputed {
            return Err(TengexError::invalid_state(format!(
                "resolution requires a disputed deal, deal {} is {}",
                deal.id, deal.state
            )));
        }
        match resolution {
            DisputeResolution::Buyer => {
                self.deliver(&mut deal, DealEventKind::Resolved, Some(actor))?;
            }
            DisputeResolution::Seller => {
                self.unwind(&mut deal, DealEventKind::Resolved, Some(actor))?;
            }
        }
        info!(deal = %deal.id, admin = %actor, winner = %resolution, "dispute resolved");
        Ok(deal.clone())
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Fetch one deal. Reads also sweep the deadline, so the returned
    /// row is never a stale overdue `PENDING`.
    pub fn deal(&self, deal_id: DealId) -> Result<Deal> {
        let cell = self.deal_cell(deal_id)?;
        let mut deal = cell.lock();
        self.expire_if_due(&mut deal)?;
        Ok(deal.clone())
    }

    /// All deals the user is a party to, oldest first.
    #[must_use]
    pub fn deals_for(&self, user: UserId) -> Vec<Deal> {
        let cells: Vec<Arc<Mutex<Deal>>> = self.deals.read().values().cloned().collect();
        let mut out = Vec::new();
        for cell in cells {
            let mut deal = cell.lock();
            if let Err(err) = self.expire_if_due(&mut deal) {
                warn!(deal = %deal.id, %err, "deadline sweep failed");
            }
            if deal.is_party(user) {
                out.push(deal.clone());
            }
        }
        out.sort_by_key(|deal| deal.created_at);
        out
    }

    /// Drain all recorded deal events, oldest first.
    pub fn drain_events(&self) -> Vec<DealEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    // =================================================================
    // Internals
    // =================================================================

    fn deal_cell(&self, deal_id: DealId) -> Result<Arc<Mutex<Deal>>> {
        self.deals
            .read()
            .get(&deal_id)
            .cloned()
            .ok_or(TengexError::DealNotFound(deal_id))
    }

    /// Cancel a pending deal whose payment deadline has passed.
    ///
    /// Runs under the per-deal mutex at the head of every operation, so
    /// exactly one caller observes `PENDING` past the deadline and
    /// performs the unwind; everyone after sees `CANCELLED`.
    fn expire_if_due(&self, deal: &mut Deal) -> Result<()> {
        if deal.state != DealState::Pending || !deal.deadline_passed(Utc::now()) {
            return Ok(());
        }
        self.unwind(deal, DealEventKind::Expired, None)?;
        info!(deal = %deal.id, deadline = %deal.deadline_at, "deal expired unpaid");
        Ok(())
    }

    /// Move escrow to the buyer and the fiat leg to the seller, then mark
    /// the deal released. Funds move first so a ledger rejection leaves
    /// the deal row untouched.
    fn deliver(&self, deal: &mut Deal, kind: DealEventKind, actor: Option<UserId>) -> Result<()> {
        self.ledger.deliver_escrow(
            deal.seller_id,
            &deal.currency,
            deal.amount,
            deal.buyer_id,
            &deal.fiat,
            deal.escrow_amount,
        )?;
        deal.transition_to(DealState::Released)?;
        info!(deal = %deal.id, "escrow delivered to buyer");
        self.push_event(DealEvent::new(deal.id, kind, actor));
        Ok(())
    }

    /// Return escrow to the seller and liquidity to the ad, then move the
    /// deal to `CANCELLED`.
    fn unwind(&self, deal: &mut Deal, kind: DealEventKind, actor: Option<UserId>) -> Result<()> {
        self.ledger
            .release(deal.seller_id, &deal.currency, deal.amount)?;
        self.ads.restore(deal.ad_id, deal.amount);
        deal.transition_to(DealState::Cancelled)?;
        self.push_event(DealEvent::new(deal.id, kind, actor));
        Ok(())
    }

    fn push_event(&self, event: DealEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl P2pDesk {
    /// Rewrite a deal's payment deadline so expiry paths can run without
    /// waiting out real time.
    pub fn force_deadline(&self, deal_id: DealId, deadline_at: chrono::DateTime<Utc>) {
        if let Some(cell) = self.deals.read().get(&deal_id) {
            cell.lock().deadline_at = deadline_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::AdRequest;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    /// A desk plus a seller funded with 10 USDT and a standing 10-USDT
    /// sell ad at 500 KZT.
    fn setup() -> (Arc<Ledger>, P2pDesk, UserId, UserId, AdId) {
        let ledger = Arc::new(Ledger::new());
        let desk = P2pDesk::new(Arc::clone(&ledger), DealConfig::default());
        let seller = UserId::new();
        let buyer = UserId::new();
        ledger.credit(seller, "USDT", dec(10)).unwrap();
        let ad = desk
            .ads()
            .post(AdRequest::sell(seller, "USDT", dec(500), dec(10)))
            .unwrap();
        (ledger, desk, seller, buyer, ad.id)
    }

    #[test]
    fn open_deal_locks_escrow_and_takes_liquidity() {
        let (ledger, desk, seller, buyer, ad_id) = setup();

        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        assert_eq!(deal.state, DealState::Pending);
        assert_eq!(deal.seller_id, seller);
        assert_eq!(deal.escrow_amount, dec(2000));
        assert_eq!(deal.fiat, "KZT");
        assert_eq!((deal.deadline_at - deal.created_at).num_minutes(), 15);

        let bal = ledger.balance(seller, "USDT");
        assert_eq!(bal.available, dec(6));
        assert_eq!(bal.locked, dec(4));
        assert_eq!(desk.ads().get(ad_id).unwrap().available, dec(6));
        assert_eq!(desk.deal(deal.id).unwrap().state, DealState::Pending);
    }

    #[test]
    fn open_deal_rejects_bad_requests() {
        let (ledger, desk, seller, buyer, ad_id) = setup();

        assert!(matches!(
            desk.open_deal(ad_id, buyer, dec(0), None),
            Err(TengexError::InvalidInput { .. })
        ));
        assert!(matches!(
            desk.open_deal(ad_id, seller, dec(1), None),
            Err(TengexError::InvalidInput { .. })
        ));
        assert!(matches!(
            desk.open_deal(AdId::new(), buyer, dec(1), None),
            Err(TengexError::AdNotFound(_))
        ));
        assert!(matches!(
            desk.open_deal(ad_id, buyer, dec(11), None),
            Err(TengexError::AdUnavailable { .. })
        ));

        // Nothing moved along the way.
        assert_eq!(desk.ads().get(ad_id).unwrap().available, dec(10));
        assert_eq!(ledger.balance(seller, "USDT").locked, dec(0));
    }

    #[test]
    fn open_deal_restores_liquidity_when_escrow_fails() {
        let (_ledger, desk, _seller, buyer, _ad_id) = setup();

        // A seller advertising liquidity they do not hold.
        let pauper = UserId::new();
        let ad = desk
            .ads()
            .post(AdRequest::sell(pauper, "USDT", dec(500), dec(10)))
            .unwrap();

        let err = desk.open_deal(ad.id, buyer, dec(4), None).unwrap_err();
        assert!(matches!(err, TengexError::InsufficientFunds { .. }));
        assert_eq!(desk.ads().get(ad.id).unwrap().available, dec(10));
    }

    #[test]
    fn happy_path_pays_both_parties_exactly_once() {
        let (ledger, desk, seller, buyer, ad_id) = setup();

        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        desk.mark_paid(deal.id, buyer).unwrap();
        let done = desk.release(deal.id, seller).unwrap();
        assert_eq!(done.state, DealState::Released);

        assert_eq!(ledger.balance(buyer, "USDT").available, dec(4));
        assert_eq!(ledger.balance(seller, "KZT").available, dec(2000));
        let seller_usdt = ledger.balance(seller, "USDT");
        assert_eq!(seller_usdt.available, dec(6));
        assert_eq!(seller_usdt.locked, dec(0));
        ledger.verify_conservation("USDT").unwrap();
        ledger.verify_conservation("KZT").unwrap();

        let kinds: Vec<_> = desk.drain_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DealEventKind::Opened,
                DealEventKind::Paid,
                DealEventKind::Released
            ]
        );
        assert!(desk.drain_events().is_empty());
    }

    #[test]
    fn mark_paid_is_buyer_only_from_pending() {
        let (_ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();

        assert!(matches!(
            desk.mark_paid(deal.id, seller),
            Err(TengexError::Forbidden { .. })
        ));
        assert!(matches!(
            desk.mark_paid(deal.id, UserId::new()),
            Err(TengexError::Forbidden { .. })
        ));

        desk.mark_paid(deal.id, buyer).unwrap();
        assert!(matches!(
            desk.mark_paid(deal.id, buyer),
            Err(TengexError::InvalidState { .. })
        ));
    }

    #[test]
    fn release_requires_paid_and_the_seller() {
        let (ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();

        // Pending deals cannot be released, even by the seller.
        assert!(matches!(
            desk.release(deal.id, seller),
            Err(TengexError::InvalidState { .. })
        ));

        desk.mark_paid(deal.id, buyer).unwrap();
        assert!(matches!(
            desk.release(deal.id, buyer),
            Err(TengexError::Forbidden { .. })
        ));
        assert!(matches!(
            desk.release(deal.id, UserId::new()),
            Err(TengexError::Forbidden { .. })
        ));
        // Escrow is still locked after all the rejections.
        assert_eq!(ledger.balance(seller, "USDT").locked, dec(4));

        desk.release(deal.id, seller).unwrap();
    }

    #[test]
    fn support_can_release_for_the_seller() {
        let (ledger, desk, _seller, buyer, ad_id) = setup();
        let support = UserId::new();
        desk.grant_support(support);

        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        desk.mark_paid(deal.id, buyer).unwrap();
        let done = desk.release(deal.id, support).unwrap();
        assert_eq!(done.state, DealState::Released);
        assert_eq!(ledger.balance(buyer, "USDT").available, dec(4));
    }

    #[test]
    fn double_release_moves_no_funds() {
        let (ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        desk.mark_paid(deal.id, buyer).unwrap();
        desk.release(deal.id, seller).unwrap();

        let err = desk.release(deal.id, seller).unwrap_err();
        assert!(matches!(err, TengexError::InvalidState { .. }));
        assert_eq!(ledger.balance(buyer, "USDT").available, dec(4));
        assert_eq!(ledger.balance(seller, "KZT").available, dec(2000));
        ledger.verify_conservation("USDT").unwrap();
    }

    #[test]
    fn cancel_returns_escrow_and_liquidity() {
        let (ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();

        let cancelled = desk.cancel(deal.id, buyer).unwrap();
        assert_eq!(cancelled.state, DealState::Cancelled);
        let bal = ledger.balance(seller, "USDT");
        assert_eq!(bal.available, dec(10));
        assert_eq!(bal.locked, dec(0));
        assert_eq!(desk.ads().get(ad_id).unwrap().available, dec(10));

        let kinds: Vec<_> = desk.drain_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![DealEventKind::Opened, DealEventKind::Cancelled]);

        // The returned liquidity can serve a fresh deal.
        let next = desk.open_deal(ad_id, buyer, dec(10), None).unwrap();
        assert_eq!(next.state, DealState::Pending);
        assert_eq!(ledger.balance(seller, "USDT").locked, dec(10));
    }

    #[test]
    fn cancel_gatekeeping() {
        let (_ledger, desk, _seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();

        assert!(matches!(
            desk.cancel(deal.id, UserId::new()),
            Err(TengexError::Forbidden { .. })
        ));

        // An admin may cancel a deal they are not a party to.
        let admin = UserId::new();
        desk.grant_admin(admin);
        assert_eq!(
            desk.cancel(deal.id, admin).unwrap().state,
            DealState::Cancelled
        );
    }

    #[test]
    fn cancel_rejected_once_paid() {
        let (ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        desk.mark_paid(deal.id, buyer).unwrap();

        let err = desk.cancel(deal.id, seller).unwrap_err();
        assert!(matches!(err, TengexError::InvalidState { .. }));
        assert_eq!(ledger.balance(seller, "USDT").locked, dec(4));
    }

    #[test]
    fn dispute_resolved_for_the_buyer_delivers_escrow() {
        let (ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        desk.mark_paid(deal.id, buyer).unwrap();
        desk.open_dispute(deal.id, buyer).unwrap();

        let admin = UserId::new();
        assert!(matches!(
            desk.resolve_dispute(deal.id, admin, DisputeResolution::Buyer),
            Err(TengexError::Forbidden { .. })
        ));
        desk.grant_admin(admin);

        let done = desk
            .resolve_dispute(deal.id, admin, DisputeResolution::Buyer)
            .unwrap();
        assert_eq!(done.state, DealState::Released);
        assert_eq!(ledger.balance(buyer, "USDT").available, dec(4));
        assert_eq!(ledger.balance(seller, "KZT").available, dec(2000));
        // Delivered liquidity does not go back to the ad.
        assert_eq!(desk.ads().get(ad_id).unwrap().available, dec(6));

        let kinds: Vec<_> = desk.drain_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DealEventKind::Opened,
                DealEventKind::Paid,
                DealEventKind::Disputed,
                DealEventKind::Resolved
            ]
        );
    }

    #[test]
    fn dispute_resolved_for_the_seller_unwinds_the_deal() {
        let (ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        // Disputes can open straight from pending.
        desk.open_dispute(deal.id, seller).unwrap();

        let admin = UserId::new();
        desk.grant_admin(admin);
        let done = desk
            .resolve_dispute(deal.id, admin, DisputeResolution::Seller)
            .unwrap();
        assert_eq!(done.state, DealState::Cancelled);

        let bal = ledger.balance(seller, "USDT");
        assert_eq!(bal.available, dec(10));
        assert_eq!(bal.locked, dec(0));
        assert_eq!(desk.ads().get(ad_id).unwrap().available, dec(10));
        assert_eq!(ledger.balance(buyer, "USDT").available, dec(0));
    }

    #[test]
    fn dispute_gatekeeping() {
        let (_ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();

        assert!(matches!(
            desk.open_dispute(deal.id, UserId::new()),
            Err(TengexError::Forbidden { .. })
        ));

        desk.open_dispute(deal.id, buyer).unwrap();
        // A dispute cannot be stacked on a dispute.
        assert!(matches!(
            desk.open_dispute(deal.id, seller),
            Err(TengexError::InvalidState { .. })
        ));

        // Resolution requires the disputed state.
        let admin = UserId::new();
        desk.grant_admin(admin);
        desk.resolve_dispute(deal.id, admin, DisputeResolution::Seller)
            .unwrap();
        assert!(matches!(
            desk.resolve_dispute(deal.id, admin, DisputeResolution::Seller),
            Err(TengexError::InvalidState { .. })
        ));
        assert!(matches!(
            desk.open_dispute(deal.id, buyer),
            Err(TengexError::InvalidState { .. })
        ));
    }

    #[test]
    fn overdue_pending_deal_expires_on_first_touch() {
        let (ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        desk.force_deadline(deal.id, Utc::now() - Duration::minutes(1));

        let seen = desk.deal(deal.id).unwrap();
        assert_eq!(seen.state, DealState::Cancelled);
        let bal = ledger.balance(seller, "USDT");
        assert_eq!(bal.available, dec(10));
        assert_eq!(bal.locked, dec(0));
        assert_eq!(desk.ads().get(ad_id).unwrap().available, dec(10));

        // A second touch finds it already settled.
        desk.deal(deal.id).unwrap();
        assert_eq!(desk.ads().get(ad_id).unwrap().available, dec(10));
        let expired = desk
            .drain_events()
            .into_iter()
            .filter(|e| e.kind == DealEventKind::Expired)
            .count();
        assert_eq!(expired, 1);
    }

    #[test]
    fn expiry_preempts_a_late_mark_paid() {
        let (ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        desk.force_deadline(deal.id, Utc::now() - Duration::minutes(1));

        let err = desk.mark_paid(deal.id, buyer).unwrap_err();
        assert!(matches!(err, TengexError::InvalidState { .. }));
        assert_eq!(desk.deal(deal.id).unwrap().state, DealState::Cancelled);
        assert_eq!(ledger.balance(seller, "USDT").locked, dec(0));
    }

    #[test]
    fn concurrent_readers_expire_a_deal_exactly_once() {
        let (ledger, desk, _seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        desk.force_deadline(deal.id, Utc::now() - Duration::minutes(1));

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| desk.deal(deal.id).unwrap());
            }
        });

        assert_eq!(desk.ads().get(ad_id).unwrap().available, dec(10));
        let expired = desk
            .drain_events()
            .into_iter()
            .filter(|e| e.kind == DealEventKind::Expired)
            .count();
        assert_eq!(expired, 1);
        ledger.verify_conservation("USDT").unwrap();
    }

    #[test]
    fn paid_deals_do_not_expire() {
        let (ledger, desk, seller, buyer, ad_id) = setup();
        let deal = desk.open_deal(ad_id, buyer, dec(4), None).unwrap();
        desk.mark_paid(deal.id, buyer).unwrap();
        desk.force_deadline(deal.id, Utc::now() - Duration::minutes(1));

        assert_eq!(desk.deal(deal.id).unwrap().state, DealState::Paid);
        assert_eq!(ledger.balance(seller, "USDT").locked, dec(4));
        // The deadline only guards the payment window; release still works.
        desk.release(deal.id, seller).unwrap();
    }

    #[test]
    fn deadline_override_is_clamped() {
        let (_ledger, desk, _seller, buyer, ad_id) = setup();

        let floor = desk.open_deal(ad_id, buyer, dec(1), Some(0)).unwrap();
        assert_eq!((floor.deadline_at - floor.created_at).num_minutes(), 1);

        let ceiling = desk.open_deal(ad_id, buyer, dec(1), Some(100_000)).unwrap();
        assert_eq!((ceiling.deadline_at - ceiling.created_at).num_minutes(), 1440);

        let custom = desk.open_deal(ad_id, buyer, dec(1), Some(30)).unwrap();
        assert_eq!((custom.deadline_at - custom.created_at).num_minutes(), 30);
    }

    #[test]
    fn deals_for_filters_by_party() {
        let (_ledger, desk, seller, buyer, ad_id) = setup();
        let other_buyer = UserId::new();
        let first = desk.open_deal(ad_id, buyer, dec(2), None).unwrap();
        let second = desk.open_deal(ad_id, other_buyer, dec(3), None).unwrap();

        let sellers_view = desk.deals_for(seller);
        assert_eq!(sellers_view.len(), 2);
        assert_eq!(sellers_view[0].id, first.id);
        assert_eq!(sellers_view[1].id, second.id);

        assert_eq!(desk.deals_for(buyer).len(), 1);
        assert!(desk.deals_for(UserId::new()).is_empty());
    }

    #[test]
    fn unknown_deal_is_not_found() {
        let (_ledger, desk, _seller, buyer, _ad_id) = setup();
        let ghost = DealId::new();
        assert!(matches!(
            desk.deal(ghost),
            Err(TengexError::DealNotFound(_))
        ));
        assert!(matches!(
            desk.mark_paid(ghost, buyer),
            Err(TengexError::DealNotFound(_))
        ));
        assert!(matches!(
            desk.cancel(ghost, buyer),
            Err(TengexError::DealNotFound(_))
        ));
    }
}
