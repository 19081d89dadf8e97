//! Fire-and-forget notifications for out-of-core collaborators.
//!
//! The payment relayer watches these to drive the payment provider. The escrow
//! never waits on, or learns about, what a collaborator does with them.
//! Correlation strings and agreement tokens are echoed here in clear so the
//! relayer can act; they are never written to the deal record.

use serde::{Deserialize, Serialize};

use crate::{AssetRef, Commitment, DealId, PartyId};

/// A signal emitted after an operation has fully committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    DealOpened {
        deal_id: DealId,
        seller: PartyId,
        buyer: PartyId,
        asset: AssetRef,
        price_cents: u64,
        correlation_hash: Commitment,
    },
    AssetDeposited {
        deal_id: DealId,
        seller: PartyId,
        asset: AssetRef,
    },
    /// Asks the relayer to set up the payment agreement with the provider.
    AgreementRequested {
        deal_id: DealId,
        correlation_id: String,
        buyer: PartyId,
        price_cents: u64,
    },
    AgreementConfirmed {
        deal_id: DealId,
        agreement_hash: Commitment,
    },
    /// Asks the relayer to initiate payment against the confirmed agreement.
    PaymentRequested {
        deal_id: DealId,
        correlation_id: String,
        agreement_token: String,
        price_cents: u64,
    },
    PaymentConfirmed {
        deal_id: DealId,
        receipt_ref: String,
        amount_cents: u64,
        currency: String,
    },
    AssetReleased {
        deal_id: DealId,
        buyer: PartyId,
        asset: AssetRef,
    },
    DealCancelled {
        deal_id: DealId,
        by: PartyId,
    },
    AssetRefunded {
        deal_id: DealId,
        seller: PartyId,
        asset: AssetRef,
    },
    OperatorGranted {
        party: PartyId,
    },
    OperatorRevoked {
        party: PartyId,
    },
}

impl Notification {
    /// The deal this notification concerns, if any.
    #[must_use]
    pub fn deal_id(&self) -> Option<DealId> {
        match self {
            Self::DealOpened { deal_id, .. }
            | Self::AssetDeposited { deal_id, .. }
            | Self::AgreementRequested { deal_id, .. }
            | Self::AgreementConfirmed { deal_id, .. }
            | Self::PaymentRequested { deal_id, .. }
            | Self::PaymentConfirmed { deal_id, .. }
            | Self::AssetReleased { deal_id, .. }
            | Self::DealCancelled { deal_id, .. }
            | Self::AssetRefunded { deal_id, .. } => Some(*deal_id),
            Self::OperatorGranted { .. } | Self::OperatorRevoked { .. } => None,
        }
    }

    /// Stable upper-case name, used as a log field.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DealOpened { .. } => "DEAL_OPENED",
            Self::AssetDeposited { .. } => "ASSET_DEPOSITED",
            Self::AgreementRequested { .. } => "AGREEMENT_REQUESTED",
            Self::AgreementConfirmed { .. } => "AGREEMENT_CONFIRMED",
            Self::PaymentRequested { .. } => "PAYMENT_REQUESTED",
            Self::PaymentConfirmed { .. } => "PAYMENT_CONFIRMED",
            Self::AssetReleased { .. } => "ASSET_RELEASED",
            Self::DealCancelled { .. } => "DEAL_CANCELLED",
            Self::AssetRefunded { .. } => "ASSET_REFUNDED",
            Self::OperatorGranted { .. } => "OPERATOR_GRANTED",
            Self::OperatorRevoked { .. } => "OPERATOR_REVOKED",
        }
    }

    /// The wire form a relayer consumes.
    ///
    /// # Errors
    /// Returns `Serialization` if encoding fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.deal_id() {
            Some(id) => write!(f, "{} {id}", self.name()),
            None => write!(f, "{}", self.name()),
        }
    }
}
