//! Tracing subscriber setup for binaries and integration harnesses embedding
//! the escrow.

use custodia_types::{EscrowError, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,custodia_engine=debug,custodia_registry=debug";

/// Install a global subscriber: `RUST_LOG` (or [`DEFAULT_FILTER`]) plus a
/// JSON or human-readable fmt layer.
///
/// # Errors
/// Returns `Configuration` if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|e| EscrowError::Configuration(format!("tracing: {e}")))
}
