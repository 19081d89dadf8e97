//! Notification sinks.
//!
//! The engine hands each committed notification to one sink. Delivery is
//! fire-and-forget: a sink cannot fail the operation that produced it, and
//! the escrow stays correct if nothing ever consumes a notification.

use std::sync::{Mutex, PoisonError};

use custodia_types::Notification;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receives notifications after an operation commits.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Logs every notification at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: &Notification) {
        info!(
            notification = notification.name(),
            deal_id = notification.deal_id().map(|id| id.0),
            "notification emitted"
        );
        match notification.to_json() {
            Ok(payload) => debug!(payload = %payload, "notification payload"),
            Err(err) => debug!(code = err.code(), error = %err, "notification not encodable"),
        }
    }
}

/// Records notifications in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<Vec<Notification>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Notification> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take everything recorded so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, notification: &Notification) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
    }
}

/// Forwards notifications to an async consumer (e.g. the payment relayer)
/// over an unbounded channel. Never blocks the engine.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Create a sink and the receiver its notifications arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: &Notification) {
        if self.tx.send(notification.clone()).is_err() {
            debug!(
                notification = notification.name(),
                "notification dropped: receiver closed"
            );
        }
    }
}
