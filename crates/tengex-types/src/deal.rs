//! # P2P escrow deal: state machine and row type
//!
//! A deal escrows a seller's crypto while the buyer pays fiat out of band.
//! The core only ever observes the two parties' claims; fiat movement itself
//! is invisible to it.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  mark_paid  ┌──────┐  release  ┌──────────┐
//!   │ PENDING ├────────────▶│ PAID ├──────────▶│ RELEASED │
//!   └──┬───┬──┘             └──┬───┘           └──────────┘
//!      │   │ dispute           │ dispute            ▲
//!      │   ▼                   ▼                    │ resolve(buyer)
//!      │  ┌──────────────────────┐                  │
//!      │  │       DISPUTED       ├──────────────────┘
//!      │  └──────────┬───────────┘
//!      │             │ resolve(seller)
//!      │ cancel / deadline expiry
//!      ▼             ▼
//!   ┌───────────────────┐
//!   │     CANCELLED     │
//!   └───────────────────┘
//! ```
//!
//! Transitions are monotonic; `RELEASED` and `CANCELLED` are terminal and
//! absorb no further operations. Deadline expiry is evaluated lazily: a
//! `PENDING` deal past its deadline is cancelled by whichever access touches
//! it first, exactly once.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AdId, Asset, DealId, UserId};

/// The lifecycle state of an escrow deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealState {
    /// Escrow is locked; waiting for the buyer to pay fiat.
    Pending,
    /// Buyer claims to have paid; waiting for the seller to release.
    Paid,
    /// One party raised a dispute; waiting for an admin ruling.
    Disputed,
    /// Escrow delivered to the buyer, fiat credited to the seller. Terminal.
    Released,
    /// Escrow returned to the seller. Terminal.
    Cancelled,
}

impl DealState {
    /// Can this deal transition to the given target state?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Paid | Self::Cancelled | Self::Disputed)
                | (Self::Paid, Self::Released | Self::Disputed)
                | (Self::Disputed, Self::Released | Self::Cancelled)
        )
    }

    /// Terminal states accept no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Cancelled)
    }
}

impl std::fmt::Display for DealState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Paid => write!(f, "PAID"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Released => write!(f, "RELEASED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Which party a dispute is resolved in favor of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeResolution {
    /// Buyer wins: escrow is delivered as if the seller had released.
    Buyer,
    /// Seller wins: escrow is returned as if the deal had been cancelled.
    Seller,
}

impl std::fmt::Display for DisputeResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buyer => write!(f, "BUYER"),
            Self::Seller => write!(f, "SELLER"),
        }
    }
}

/// A P2P escrow deal row.
///
/// `escrow_amount = amount x price`, fixed at open time. The fiat currency
/// is copied from the desk configuration so the row stays self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub ad_id: AdId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// The crypto currency held in escrow.
    pub currency: Asset,
    /// Crypto quantity held in escrow.
    pub amount: Decimal,
    /// Fiat price per unit of `currency`.
    pub price: Decimal,
    /// The fiat currency the buyer pays in (e.g., "KZT").
    pub fiat: Asset,
    /// Fiat the buyer owes = `amount x price`.
    pub escrow_amount: Decimal,
    pub state: DealState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// A `PENDING` deal past this instant cancels on next touch.
    pub deadline_at: DateTime<Utc>,
}

impl Deal {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether `now` is past the payment deadline.
    #[must_use]
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline_at
    }

    /// Whether the given user is the buyer or the seller.
    #[must_use]
    pub fn is_party(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }

    /// Guarded state transition. Updates `updated_at` on success.
    ///
    /// # Errors
    /// Returns `InvalidState` if the transition is not legal from the
    /// current state.
    pub fn transition_to(&mut self, target: DealState) -> crate::Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(crate::TengexError::invalid_state(format!(
                "deal {} cannot go from {} to {target}",
                self.id, self.state
            )));
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Dummy deal for unit tests.
#[cfg(any(test, feature = "test-helpers"))]
impl Deal {
    pub fn dummy(buyer: UserId, seller: UserId, amount: Decimal, price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: DealId::new(),
            ad_id: AdId::new(),
            buyer_id: buyer,
            seller_id: seller,
            currency: "USDT".to_string(),
            amount,
            price,
            fiat: "KZT".to_string(),
            escrow_amount: amount * price,
            state: DealState::Pending,
            created_at: now,
            updated_at: now,
            deadline_at: now + chrono::Duration::minutes(15),
        }
    }
}
