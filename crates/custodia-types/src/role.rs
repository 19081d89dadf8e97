//! Authority model.
//!
//! Two flat role sets (no hierarchy): exactly one `Admin`, and any number of
//! `Operator`s. Deal-relative authority (the seller of record) is expressed
//! through [`Authority`], which is what an operation declares it requires.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Global roles held in the access-control table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Emergency intervention and cancellation co-authority. Set once.
    Admin,
    /// Confirms off-ledger facts (agreement, payment) into the escrow.
    Operator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "ADMIN"),
            Self::Operator => write!(f, "OPERATOR"),
        }
    }
}

/// What a gated operation requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authority {
    Admin,
    Operator,
    /// The seller recorded on the deal.
    Seller,
    /// The seller recorded on the deal, or the admin.
    SellerOrAdmin,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "ADMIN"),
            Self::Operator => write!(f, "OPERATOR"),
            Self::Seller => write!(f, "SELLER"),
            Self::SellerOrAdmin => write!(f, "SELLER_OR_ADMIN"),
        }
    }
}
