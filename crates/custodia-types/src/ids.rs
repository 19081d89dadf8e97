//! Identifiers used throughout Custodia.
//!
//! Deal identifiers are allocated sequentially by the deal registry; parties
//! use UUIDv7 so they sort by creation time. An asset is addressed by the
//! registry that records it plus its unit identifier within that registry.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// DealId
// ---------------------------------------------------------------------------

/// Sequential deal identifier. The first deal is `1`; ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DealId(pub u64);

impl DealId {
    /// The identifier the registry hands out first.
    pub const FIRST: Self = Self(1);

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deal:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PartyId
// ---------------------------------------------------------------------------

/// Identity of a participant: seller, buyer, operator, admin, or the escrow
/// custodian itself. The nil UUID is the "zero identity" and is never valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PartyId(pub Uuid);

impl PartyId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The zero identity.
    #[must_use]
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// First eight hex characters, for compact log fields.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }
}

impl Default for PartyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AssetRef
// ---------------------------------------------------------------------------

/// Reference to a single non-fungible unit held by an external registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AssetRef {
    /// Name or address of the registry holding the asset.
    pub registry: String,
    /// Unit identifier within that registry.
    pub unit_id: u64,
}

impl AssetRef {
    #[must_use]
    pub fn new(registry: impl Into<String>, unit_id: u64) -> Self {
        Self {
            registry: registry.into(),
            unit_id,
        }
    }

    /// An asset with no registry cannot be resolved.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.registry.trim().is_empty()
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.registry, self.unit_id)
    }
}

/// Random identities and assets for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl PartyId {
    pub fn random() -> Self {
        Self::from_bytes(rand::random::<[u8; 16]>())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl AssetRef {
    pub fn dummy() -> Self {
        Self::new("test-registry", rand::random::<u64>())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
