//! Error types for the Custodia escrow.
//!
//! All errors use the `CU_ERR_` prefix convention for easy grepping in logs.
//! Every error aborts exactly one operation and leaves stored state untouched.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors
//! - 2xx: Authorization errors
//! - 3xx: Deal / state errors
//! - 4xx: Commitment errors
//! - 5xx: Custody errors
//! - 6xx: Timeout errors
//! - 7xx: Payment errors
//! - 9xx: General errors (re-entrancy, configuration, serialization)

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{Authority, DealId, DealState, PartyId};

/// Central error enum for all escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A required argument is missing, empty, zero, or otherwise malformed.
    #[error("CU_ERR_100: Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// The caller lacks the role or relationship the operation requires.
    #[error("CU_ERR_200: Caller {caller} is not authorized, requires {required}")]
    Unauthorized { caller: PartyId, required: Authority },

    // =================================================================
    // Deal / State Errors (3xx)
    // =================================================================
    /// No deal with this identifier has been opened.
    #[error("CU_ERR_300: Deal not found: {0}")]
    DealNotFound(DealId),

    /// The deal is not in a state that permits the operation.
    #[error(
        "CU_ERR_301: State mismatch: expected {}, got {actual}",
        format_states(.expected)
    )]
    StateMismatch {
        expected: Vec<DealState>,
        actual: DealState,
    },

    // =================================================================
    // Commitment Errors (4xx)
    // =================================================================
    /// The supplied plaintext does not hash to the stored commitment.
    #[error("CU_ERR_400: Commitment mismatch for {field}")]
    CommitmentMismatch { field: &'static str },

    // =================================================================
    // Custody Errors (5xx)
    // =================================================================
    /// The asset registry refused or could not satisfy a custody check.
    #[error("CU_ERR_500: Custody failure: {0}")]
    CustodyFailure(#[from] CustodyError),

    // =================================================================
    // Timeout Errors (6xx)
    // =================================================================
    /// A refund was attempted before its window elapsed.
    #[error("CU_ERR_600: Refund not permitted until {eligible_at}")]
    TimeoutNotReached { eligible_at: DateTime<Utc> },

    // =================================================================
    // Payment Errors (7xx)
    // =================================================================
    /// The confirmed amount differs from the agreed price.
    #[error("CU_ERR_700: Amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: u64, actual: u64 },

    // =================================================================
    // General (9xx)
    // =================================================================
    /// A state-mutating operation was invoked from inside another one
    /// (e.g. from an asset-registry callback).
    #[error("CU_ERR_900: Re-entrant call rejected")]
    ReentrantCall,

    /// Configuration error (invalid config document, zero windows, etc.).
    #[error("CU_ERR_901: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("CU_ERR_902: Serialization error: {0}")]
    Serialization(String),
}

impl EscrowError {
    /// The stable `CU_ERR_` code, without the message.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "CU_ERR_100",
            Self::Unauthorized { .. } => "CU_ERR_200",
            Self::DealNotFound(_) => "CU_ERR_300",
            Self::StateMismatch { .. } => "CU_ERR_301",
            Self::CommitmentMismatch { .. } => "CU_ERR_400",
            Self::CustodyFailure(_) => "CU_ERR_500",
            Self::TimeoutNotReached { .. } => "CU_ERR_600",
            Self::AmountMismatch { .. } => "CU_ERR_700",
            Self::ReentrantCall => "CU_ERR_900",
            Self::Configuration(_) => "CU_ERR_901",
            Self::Serialization(_) => "CU_ERR_902",
        }
    }
}

/// Failures reported by an asset registry through the custody bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    /// The registry has no record of the asset.
    #[error("unknown asset {0}")]
    UnknownAsset(String),

    /// The asset is not held by the party the operation expects.
    #[error("asset held by {actual}, expected {expected}")]
    NotHolder { expected: PartyId, actual: PartyId },

    /// The holder has not authorized the escrow to move the asset.
    #[error("transfer of {0} not authorized")]
    NotAuthorized(String),

    /// The receiving side declined the transfer.
    #[error("transfer rejected: {reason}")]
    Rejected { reason: String },
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EscrowError>;

impl From<serde_json::Error> for EscrowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

fn format_states(states: &[DealState]) -> String {
    states
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("|")
}
