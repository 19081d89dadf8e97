//! Configuration for an escrow instance.

use serde::{Deserialize, Serialize};

use crate::{EscrowError, Result, constants};

/// Refund windows, in seconds. Both are measured from a stored timestamp on
/// the deal: the agreement window from `deposited_at`, the payment window
/// from `agreed_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// How long an operator has to confirm the payment agreement.
    pub agreement_window_secs: u64,
    /// How long an operator has to confirm the payment itself.
    pub payment_window_secs: u64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            agreement_window_secs: constants::DEFAULT_AGREEMENT_WINDOW_SECS,
            payment_window_secs: constants::DEFAULT_PAYMENT_WINDOW_SECS,
        }
    }
}

impl EscrowConfig {
    /// Parse and validate a JSON config document. Missing fields take
    /// their defaults.
    pub fn from_json(doc: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(doc)
            .map_err(|e| EscrowError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Both windows must be non-zero and representable as a `chrono::Duration`.
    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("agreement_window_secs", self.agreement_window_secs),
            ("payment_window_secs", self.payment_window_secs),
        ] {
            if secs == 0 {
                return Err(EscrowError::Configuration(format!("{name} must be > 0")));
            }
            if i64::try_from(secs).is_err() {
                return Err(EscrowError::Configuration(format!("{name} out of range")));
            }
        }
        Ok(())
    }
}
