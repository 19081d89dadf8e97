//! # custodia-types
//!
//! Shared types, errors, and configuration for the **Custodia** custody escrow.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`DealId`], [`PartyId`], [`AssetRef`]
//! - **Deal model**: [`Deal`], [`DealState`], [`PaymentRecord`]
//! - **Authority model**: [`Role`], [`Authority`]
//! - **Commitments**: [`Commitment`] (the stored half of commit-then-reveal)
//! - **Notifications**: [`Notification`] for out-of-core collaborators
//! - **Configuration**: [`EscrowConfig`]
//! - **Time**: [`Clock`], [`SystemClock`]
//! - **Errors**: [`EscrowError`] with `CU_ERR_` prefix codes, [`CustodyError`]
//! - **Constants**: default windows and domain tags

pub mod commitment;
pub mod config;
pub mod constants;
pub mod deal;
pub mod error;
pub mod ids;
pub mod notification;
pub mod role;
pub mod time;

// Re-export all primary types at crate root for ergonomic imports:
//   use custodia_types::{Deal, DealState, PartyId, EscrowError, ...};

pub use commitment::*;
pub use config::*;
pub use deal::*;
pub use error::*;
pub use ids::*;
pub use notification::*;
pub use role::*;
pub use time::*;

// Constants are accessed via `custodia_types::constants::FOO`
// (not re-exported to avoid name collisions).
