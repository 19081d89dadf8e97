//! System-wide constants for the Custodia escrow.

/// Seconds in one day.
pub const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Default agreement-confirmation window: refund becomes available this long
/// after `deposited_at` if no agreement has been confirmed.
pub const DEFAULT_AGREEMENT_WINDOW_SECS: u64 = 7 * SECS_PER_DAY;

/// Default payment-confirmation window: refund becomes available this long
/// after `agreed_at` if no payment has been confirmed.
pub const DEFAULT_PAYMENT_WINDOW_SECS: u64 = 30 * SECS_PER_DAY;

/// Domain separation tag prefixed to every commitment preimage.
pub const COMMITMENT_DOMAIN_TAG: &[u8] = b"custodia:commitment:v1:";

/// Minor units per major currency unit (cents).
pub const MINOR_UNITS_SCALE: u32 = 2;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Custodia";
