//! # custodia-engine
//!
//! **Deal State Machine**: the guarded transitions that move a custody record
//! from creation through asset deposit, payment-agreement confirmation, and
//! payment confirmation, or on failure through cancellation and refund.
//!
//! ## Architecture
//!
//! 1. **AccessControl**: one admin, a settable operator set, per-call checks
//! 2. **DealRegistry**: append-only keyed store, sequential ids from 1
//! 3. **commitment**: SHA-256 commit / verify for correlation ids and agreement tokens
//! 4. **TimeoutPolicy**: agreement and payment windows, pure refund predicate
//! 5. **OperationGate**: serializes mutating operations, rejects re-entry
//! 6. **EscrowEngine**: validates, stages, moves custody, notifies
//!
//! ## Operation Flow
//!
//! ```text
//! caller → OperationGate.enter() → validate args → AccessControl → state check
//!        → commitment / timeout / amount → custody re-validation
//!        → stage post-state in DealRegistry → CustodyBridge.transfer()
//!            ├─ ok:  NotificationSink.notify()
//!            └─ err: restore pre-state, CustodyFailure
//! ```
//!
//! Every failure leaves the registry exactly as it was before the call.

pub mod access;
pub mod commitment;
pub mod engine;
pub mod gate;
pub mod registry;
pub mod sink;
pub mod telemetry;
pub mod timeout;

pub use access::AccessControl;
pub use engine::EscrowEngine;
pub use gate::OperationGate;
pub use registry::DealRegistry;
pub use sink::{ChannelSink, MemorySink, NotificationSink, TracingSink};
pub use timeout::TimeoutPolicy;
