//! # Deal: the custody escrow record
//!
//! A `Deal` binds a seller, a buyer, one non-fungible asset unit, and an
//! agreed price to a sequence of off-ledger payment confirmations.
//!
//! ## State Machine
//!
//! ```text
//!            deposit            confirm_agreement                 confirm_payment
//!   OPENED ──────────▶ DEPOSITED ─────────────────▶ AGREEMENT_CONFIRMED ───────────────▶ PAID
//!    │   │                │                              │
//!    │   │ cancel         │ refund_asset                 │ refund_asset
//!    │   ▼                │ emergency_refund             │ emergency_refund
//!    │  CANCELLED         ▼                              │
//!    └───────────────▶ REFUNDED ◀────────────────────────┘
//!     emergency_refund
//! ```
//!
//! Transitions are **monotonic**: no state is ever revisited, and the three
//! terminal states (`PAID`, `CANCELLED`, `REFUNDED`) have no outgoing edges.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AssetRef, Commitment, DealId, PartyId, constants};

/// The lifecycle state of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealState {
    /// Created by the seller. The asset is still with the seller.
    Opened,
    /// The asset is held by the escrow custodian.
    Deposited,
    /// An operator attested that the off-ledger payment agreement exists.
    AgreementConfirmed,
    /// Payment confirmed and the asset released to the buyer. **Terminal.**
    Paid,
    /// Cancelled before deposit. The asset never moved. **Terminal.**
    Cancelled,
    /// The asset went back to the seller (or never left). **Terminal.**
    Refunded,
}

impl DealState {
    /// Every state, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Opened,
        Self::Deposited,
        Self::AgreementConfirmed,
        Self::Paid,
        Self::Cancelled,
        Self::Refunded,
    ];

    /// Can a deal in this state move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Opened,
                Self::Deposited | Self::Cancelled | Self::Refunded
            ) | (Self::Deposited, Self::AgreementConfirmed | Self::Refunded)
                | (Self::AgreementConfirmed, Self::Paid | Self::Refunded)
        )
    }

    /// `true` for `Paid`, `Cancelled`, and `Refunded`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled | Self::Refunded)
    }

    /// `true` while the escrow custodian is expected to hold the asset.
    #[must_use]
    pub fn is_in_custody(&self) -> bool {
        matches!(self, Self::Deposited | Self::AgreementConfirmed)
    }
}

impl fmt::Display for DealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened => write!(f, "OPENED"),
            Self::Deposited => write!(f, "DEPOSITED"),
            Self::AgreementConfirmed => write!(f, "AGREEMENT_CONFIRMED"),
            Self::Paid => write!(f, "PAID"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Refunded => write!(f, "REFUNDED"),
        }
    }
}

/// What the operator attested when confirming payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Provider receipt / transaction reference.
    pub receipt_ref: String,
    /// ISO currency code as reported by the provider.
    pub currency: String,
    /// Confirmed amount in minor units. Always equals the deal price.
    pub amount_cents: u64,
    pub confirmed_at: DateTime<Utc>,
}

/// A custody escrow record. Never deleted; terminal deals stay queryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    /// The party that opened the deal and owns the asset.
    pub seller: PartyId,
    /// The party the asset is released to on payment.
    pub buyer: PartyId,
    pub asset: AssetRef,
    /// Agreed price in minor currency units. Always > 0.
    pub price_cents: u64,
    /// Commitment to the payment-system correlation string. Immutable.
    pub correlation_hash: Commitment,
    /// Commitment to the payment-agreement token. Write-once.
    pub agreement_hash: Option<Commitment>,
    pub state: DealState,
    pub opened_at: DateTime<Utc>,
    /// Set once by `deposit`.
    pub deposited_at: Option<DateTime<Utc>>,
    /// Set once by `confirm_agreement`.
    pub agreed_at: Option<DateTime<Utc>>,
    /// Set once by `confirm_payment`.
    pub payment: Option<PaymentRecord>,
    /// When the deal reached a terminal state.
    pub closed_at: Option<DateTime<Utc>>,
}

impl Deal {
    /// A freshly opened deal.
    #[must_use]
    pub fn opened(
        id: DealId,
        seller: PartyId,
        buyer: PartyId,
        asset: AssetRef,
        price_cents: u64,
        correlation_hash: Commitment,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            seller,
            buyer,
            asset,
            price_cents,
            correlation_hash,
            agreement_hash: None,
            state: DealState::Opened,
            opened_at: now,
            deposited_at: None,
            agreed_at: None,
            payment: None,
            closed_at: None,
        }
    }

    /// The price in major currency units (e.g. `1000.00`).
    #[must_use]
    pub fn price(&self) -> Decimal {
        Decimal::from(self.price_cents) * Decimal::new(1, constants::MINOR_UNITS_SCALE)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `target`, stamping `closed_at` when the target is terminal.
    ///
    /// # Errors
    /// Returns `StateMismatch` if the edge does not exist.
    pub fn advance(&mut self, target: DealState, now: DateTime<Utc>) -> crate::Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(crate::EscrowError::StateMismatch {
                expected: DealState::ALL
                    .into_iter()
                    .filter(|s| s.can_transition_to(target))
                    .collect(),
                actual: self.state,
            });
        }
        self.state = target;
        if target.is_terminal() {
            self.closed_at = Some(now);
        }
        Ok(())
    }
}
