//! Commitment verifier.
//!
//! `commit` turns a caller-supplied string into the digest stored on a deal;
//! `verify` checks a re-supplied plaintext against it. The preimage is
//! domain-tagged and length-prefixed, so strings that share a prefix
//! (`INV-1` / `INV-1-EXTRA`) never collide structurally.

use custodia_types::{Commitment, EscrowError, Result, constants};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hash `raw` into a commitment. Deterministic.
#[must_use]
pub fn commit(raw: &str) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update(constants::COMMITMENT_DOMAIN_TAG);
    hasher.update((raw.len() as u64).to_le_bytes());
    hasher.update(raw.as_bytes());
    Commitment(hasher.finalize().into())
}

/// Does `raw` hash to `stored`? Compares in constant time.
#[must_use]
pub fn verify(raw: &str, stored: &Commitment) -> bool {
    commit(raw)
        .as_bytes()
        .as_slice()
        .ct_eq(stored.as_bytes().as_slice())
        .into()
}

/// `verify`, surfaced as `CommitmentMismatch { field }` on failure.
pub fn require_match(field: &'static str, raw: &str, stored: &Commitment) -> Result<()> {
    if verify(raw, stored) {
        Ok(())
    } else {
        Err(EscrowError::CommitmentMismatch { field })
    }
}
