//! # custodia-registry
//!
//! **Custody Bridge**: the narrow interface the escrow needs from an external
//! non-fungible asset registry.
//!
//! ## Architecture
//!
//! The escrow never assumes it is the only entity able to hold an asset. It
//! asks the registry, immediately before every custody-dependent step:
//! 1. **Who holds it?** [`CustodyBridge::current_holder`]
//! 2. **May I move it?** [`CustodyBridge::is_transfer_authorized`]
//! 3. **Move it.** [`CustodyBridge::transfer`], which calls
//!    [`CustodyReceiver::on_custody_received`] on the recipient when the
//!    recipient is a receiver (the escrow itself).
//!
//! [`InMemoryAssetRegistry`] is a complete reference registry used by the
//! test suites and by embedders that keep custody records in-process.

pub mod bridge;
pub mod memory;

pub use bridge::{CustodyBridge, CustodyReceiver, CustodyResult};
pub use memory::InMemoryAssetRegistry;
