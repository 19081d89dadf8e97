//! Timeout policy: when does a stuck deal become refundable?
//!
//! Two fixed windows, each measured from a timestamp stored on the deal:
//! - `DEPOSITED`: `deposited_at + agreement_window`
//! - `AGREEMENT_CONFIRMED`: `agreed_at + payment_window`
//!
//! The boundary is inclusive: a refund at exactly the eligibility instant is
//! allowed, one second earlier is not. Timeouts never fire on their own;
//! they only permit a refund call.

use chrono::{DateTime, Duration, Utc};
use custodia_types::{Deal, DealState, EscrowConfig, EscrowError, Result};

/// States in which a timeout-gated refund can apply.
pub const REFUNDABLE_STATES: [DealState; 2] = [DealState::Deposited, DealState::AgreementConfirmed];

/// Agreement and payment windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    agreement_window: Duration,
    payment_window: Duration,
}

impl TimeoutPolicy {
    #[must_use]
    pub fn new(agreement_window: Duration, payment_window: Duration) -> Self {
        Self {
            agreement_window,
            payment_window,
        }
    }

    /// Build from a config, validating it first.
    pub fn from_config(config: &EscrowConfig) -> Result<Self> {
        config.validate()?;
        let seconds = |secs: u64| {
            i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or_else(|| EscrowError::Configuration(format!("window {secs}s out of range")))
        };
        Ok(Self::new(
            seconds(config.agreement_window_secs)?,
            seconds(config.payment_window_secs)?,
        ))
    }

    #[must_use]
    pub fn agreement_window(&self) -> Duration {
        self.agreement_window
    }

    #[must_use]
    pub fn payment_window(&self) -> Duration {
        self.payment_window
    }

    /// The instant from which a refund is permitted, or `None` if the deal
    /// is not in a refundable state.
    #[must_use]
    pub fn refund_eligible_at(&self, deal: &Deal) -> Option<DateTime<Utc>> {
        let (start, window) = match deal.state {
            DealState::Deposited => (deal.deposited_at?, self.agreement_window),
            DealState::AgreementConfirmed => (deal.agreed_at?, self.payment_window),
            _ => return None,
        };
        Some(
            start
                .checked_add_signed(window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Side-effect-free refund predicate.
    #[must_use]
    pub fn can_refund(&self, deal: &Deal, now: DateTime<Utc>) -> bool {
        self.refund_eligible_at(deal).is_some_and(|at| now >= at)
    }

    /// # Errors
    /// - `StateMismatch` if the deal is not `DEPOSITED` or `AGREEMENT_CONFIRMED`
    /// - `TimeoutNotReached` carrying the eligibility instant if it is too early
    pub fn check_refund(&self, deal: &Deal, now: DateTime<Utc>) -> Result<()> {
        let eligible_at =
            self.refund_eligible_at(deal)
                .ok_or_else(|| EscrowError::StateMismatch {
                    expected: REFUNDABLE_STATES.to_vec(),
                    actual: deal.state,
                })?;
        if now < eligible_at {
            return Err(EscrowError::TimeoutNotReached { eligible_at });
        }
        Ok(())
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(Duration::days(7), Duration::days(30))
    }
}
