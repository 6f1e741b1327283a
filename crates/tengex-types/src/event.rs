//! Logical deal events for external notification dispatch.
//!
//! The desk records an event for every deal transition; a notifier drains
//! them out of band ([`crate::Deal`] rows stay the source of truth).
//! Pull-model delivery means a slow or failing notifier can never block or
//! roll back a fund movement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DealId, UserId};

/// What happened to a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealEventKind {
    /// Deal opened; escrow locked.
    Opened,
    /// Buyer marked the fiat payment as sent.
    Paid,
    /// Seller (or support) released escrow to the buyer.
    Released,
    /// Deal cancelled by a party or admin; escrow returned.
    Cancelled,
    /// Deal cancelled by deadline expiry; escrow returned.
    Expired,
    /// A party opened a dispute.
    Disputed,
    /// An admin resolved a dispute.
    Resolved,
}

impl std::fmt::Display for DealEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened => write!(f, "OPENED"),
            Self::Paid => write!(f, "PAID"),
            Self::Released => write!(f, "RELEASED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// One deal lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealEvent {
    pub deal_id: DealId,
    pub kind: DealEventKind,
    /// The user who caused the transition, when one did (expiry has none).
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

impl DealEvent {
    #[must_use]
    pub fn new(deal_id: DealId, kind: DealEventKind, actor: Option<UserId>) -> Self {
        Self {
            deal_id,
            kind,
            actor,
            occurred_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for DealEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.deal_id, self.kind)
    }
}
