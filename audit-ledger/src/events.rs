//! Outbound notification channel
//!
//! The ledger publishes after every successful submit and seal. Delivery is
//! fire-and-forget: a listener that falls more than the channel capacity behind
//! loses the oldest notifications, and nothing is buffered when nobody listens.

use crate::types::{SealedBlock, Transaction};
use serde::Serialize;
use tokio::sync::broadcast;

/// Notification emitted by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LedgerNotification {
    /// A transaction entered the pending buffer
    TransactionAppended(Transaction),
    /// A block was sealed and persisted
    BlockSealed(SealedBlock),
}

/// Broadcast publisher
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<LedgerNotification>,
}

impl Notifier {
    /// Create a notifier buffering `capacity` messages per listener
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new listener
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerNotification> {
        self.sender.subscribe()
    }

    /// Publish to current listeners, returns how many received it
    pub fn publish(&self, notification: LedgerNotification) -> usize {
        // No listeners is not an error
        self.sender.send(notification).unwrap_or(0)
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
