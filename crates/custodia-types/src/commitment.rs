//! The stored half of a commit-then-reveal pair.
//!
//! Only the digest of a correlation string or agreement token is ever kept in
//! a [`Deal`](crate::Deal). The plaintext is re-supplied by the caller at the
//! moment it is needed and checked against this value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// SHA-256 digest of a domain-tagged, length-prefixed preimage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}
