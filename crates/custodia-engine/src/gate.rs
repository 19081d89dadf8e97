//! Operation gate: one state-mutating operation at a time, never nested.
//!
//! Threads queue on the gate and run their operations in turn. A thread that
//! already holds the gate and tries to enter again (an asset registry calling
//! back into the escrow during a transfer) is rejected with `ReentrantCall`
//! instead of deadlocking. Read-only queries take the gate through
//! [`OperationGate::observe`], so they never see a transition that is still
//! waiting on the asset registry; the thread inside the operation reads
//! through without waiting.

use std::{
    sync::{Condvar, Mutex, PoisonError},
    thread::{self, ThreadId},
};

use custodia_types::{EscrowError, Result};
use tracing::debug;

/// Serializing, non-reentrant guard around mutating operations.
#[derive(Debug, Default)]
pub struct OperationGate {
    /// The thread currently inside an operation, if any.
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl OperationGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the gate and take it.
    ///
    /// # Errors
    /// Returns `ReentrantCall` if the calling thread already holds the gate.
    pub fn enter(&self) -> Result<GateToken<'_>> {
        self.acquire().ok_or_else(|| {
            debug!("re-entrant operation rejected");
            EscrowError::ReentrantCall
        })
    }

    /// Wait until no other thread is inside an operation.
    ///
    /// Returns a token when the gate was taken, or `None` when the calling
    /// thread already holds it (a registry callback reading mid-transfer).
    pub fn observe(&self) -> Option<GateToken<'_>> {
        self.acquire()
    }

    /// Block while another thread holds the gate, then take it.
    /// `None` if the calling thread is the holder.
    fn acquire(&self) -> Option<GateToken<'_>> {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match *owner {
                None => {
                    *owner = Some(me);
                    return Some(GateToken { gate: self });
                }
                Some(holder) if holder == me => return None,
                Some(_) => {
                    owner = self
                        .released
                        .wait(owner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

/// Proof of holding the gate. Releases it on drop, including on early
/// return and unwinding.
#[must_use = "the gate is released as soon as the token is dropped"]
pub struct GateToken<'a> {
    gate: &'a OperationGate,
}

impl Drop for GateToken<'_> {
    fn drop(&mut self) {
        *self
            .gate
            .owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.gate.released.notify_one();
    }
}
