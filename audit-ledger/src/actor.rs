//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using a Tokio actor:
//! - One task owns the pending buffer and the chain tip
//! - Submissions, threshold seals, timer seals and the shutdown seal are all
//!   messages or ticks handled by that task, one at a time
//! - Reads never go through the actor; they hit storage directly
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Producers / API layer / simulator              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ Pending: Vec<Transaction>                      │  │
//! │  │ Timer: 30s tick or 100 pending → seal()        │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                       │                               │
//! │                       ▼                               │
//! │           Storage::put_sealed_block()                 │
//! │          (atomic write to RocksDB)                    │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::config::SealingConfig;
use crate::crypto::Hash256;
use crate::events::{LedgerNotification, Notifier};
use crate::merkle::merkle_root;
use crate::metrics::Metrics;
use crate::types::{AssetEvent, Block, SealedBlock, Transaction};
use crate::{Error, Result, Storage};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Most recently sealed block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    /// Block height
    pub block_number: u64,
    /// Block hash
    pub block_hash: Hash256,
}

impl From<&Block> for ChainTip {
    fn from(block: &Block) -> Self {
        Self {
            block_number: block.block_number,
            block_hash: block.block_hash,
        }
    }
}

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Hash an event and append it to the pending buffer
    Submit {
        event: AssetEvent,
        response: oneshot::Sender<Result<Hash256>>,
    },

    /// Seal pending transactions now
    Seal {
        response: oneshot::Sender<Result<Option<SealedBlock>>>,
    },

    /// Current pending buffer size
    PendingCount { response: oneshot::Sender<usize> },

    /// Current chain tip
    GetTip { response: oneshot::Sender<ChainTip> },

    /// Final seal, then stop; a failed seal keeps the actor running
    Shutdown {
        response: oneshot::Sender<Result<Option<SealedBlock>>>,
    },
}

/// Actor that owns the pending buffer and chain state
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Outbound notifications
    notifier: Notifier,

    /// Metrics
    metrics: Metrics,

    /// Last sealed block
    tip: ChainTip,

    /// Pending transactions in inclusion order
    pending: Vec<Transaction>,

    /// Hashes of `pending`, for duplicate rejection
    pending_hashes: HashSet<Hash256>,

    /// Pending count that triggers a seal
    max_transactions_per_block: usize,

    /// Timer seal interval
    block_interval: Duration,

    /// Timer enabled
    timer_enabled: bool,
}

impl std::fmt::Debug for LedgerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerActor")
            .field("tip", &self.tip)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl LedgerActor {
    /// Create new actor positioned at `tip`
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        tip: ChainTip,
        sealing: &SealingConfig,
        notifier: Notifier,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            mailbox,
            notifier,
            metrics,
            tip,
            pending: Vec::with_capacity(sealing.max_transactions_per_block),
            pending_hashes: HashSet::new(),
            max_transactions_per_block: sealing.max_transactions_per_block,
            block_interval: Duration::from_millis(sealing.block_interval_ms),
            timer_enabled: sealing.timer_enabled,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut seal_timer = interval_at(Instant::now() + self.block_interval, self.block_interval);
        seal_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if self.timer_enabled {
            tracing::info!(
                interval_ms = self.block_interval.as_millis() as u64,
                "Block timer started"
            );
        }

        loop {
            tokio::select! {
                msg = self.mailbox.recv() => {
                    match msg {
                        Some(LedgerMessage::Shutdown { response }) => {
                            match self.seal() {
                                Ok(sealed) => {
                                    let _ = response.send(Ok(sealed));
                                    break;
                                }
                                Err(e) => {
                                    // Pending stays buffered so the caller can retry
                                    tracing::warn!(
                                        pending = self.pending.len(),
                                        "Shutdown seal failed, actor keeps running"
                                    );
                                    let _ = response.send(Err(e));
                                }
                            }
                        }
                        Some(msg) => self.handle_message(msg),
                        None => {
                            // Every handle dropped
                            if let Err(e) = self.seal() {
                                tracing::error!(
                                    error = %e,
                                    pending = self.pending.len(),
                                    "Final seal failed with no handle left to retry"
                                );
                            }
                            break;
                        }
                    }
                }

                _ = seal_timer.tick(), if self.timer_enabled => {
                    if !self.pending.is_empty() {
                        // Failure already logged; transactions stay pending for the next tick
                        let _ = self.seal();
                    }
                }
            }
        }

        tracing::info!(
            block_number = self.tip.block_number,
            "Block timer stopped, ledger actor exiting"
        );
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Submit { event, response } => {
                let result = self.submit(event);
                let _ = response.send(result);
            }

            LedgerMessage::Seal { response } => {
                let result = self.seal();
                let _ = response.send(result);
            }

            LedgerMessage::PendingCount { response } => {
                let _ = response.send(self.pending.len());
            }

            LedgerMessage::GetTip { response } => {
                let _ = response.send(self.tip);
            }

            LedgerMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }

    /// Hash and buffer an event, sealing when the threshold is reached
    fn submit(&mut self, event: AssetEvent) -> Result<Hash256> {
        let tx = Transaction::from_event(event, Utc::now())?;
        let hash = self.accept(tx)?;

        if self.pending.len() >= self.max_transactions_per_block {
            // A failed threshold seal keeps the buffer; the hash is still accepted
            let _ = self.seal();
        }

        Ok(hash)
    }

    /// Append a hashed transaction unless its hash is already known
    fn accept(&mut self, tx: Transaction) -> Result<Hash256> {
        let hash = tx.transaction_hash;

        if self.pending_hashes.contains(&hash) || self.storage.live_view().contains_transaction(&hash)? {
            return Err(Error::InvalidTransaction(format!(
                "duplicate transaction {}",
                hash
            )));
        }

        tracing::debug!(
            transaction_hash = %hash,
            asset_id = %tx.asset_id,
            event_type = %tx.event_type,
            "Transaction appended"
        );

        self.pending_hashes.insert(hash);
        self.pending.push(tx.clone());
        self.metrics.record_submission(self.pending.len());
        self.notifier
            .publish(LedgerNotification::TransactionAppended(tx));

        Ok(hash)
    }

    /// Seal the pending buffer into the next block
    ///
    /// All-or-nothing: the tip and the buffer only change after the block and
    /// its transactions are committed.
    fn seal(&mut self) -> Result<Option<SealedBlock>> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let started = std::time::Instant::now();
        let leaves: Vec<Hash256> = self.pending.iter().map(|tx| tx.transaction_hash).collect();

        let block = Block::seal(
            self.tip.block_number + 1,
            self.tip.block_hash,
            merkle_root(&leaves),
            Utc::now(),
            self.pending.len() as u32,
        );

        if let Err(e) = self.storage.put_sealed_block(&block, &self.pending) {
            self.metrics.record_seal_failure();
            tracing::error!(
                block_number = block.block_number,
                pending = self.pending.len(),
                error = %e,
                "Seal aborted, transactions remain pending"
            );
            return Err(Error::PersistenceFailure(e.to_string()));
        }

        self.tip = ChainTip::from(&block);
        self.pending.clear();
        self.pending_hashes.clear();

        self.metrics
            .record_seal(block.event_count, started.elapsed().as_secs_f64());

        tracing::info!(
            block_number = block.block_number,
            block_hash = %block.block_hash,
            event_count = block.event_count,
            "Block sealed"
        );

        let summary = SealedBlock::from(&block);
        self.notifier
            .publish(LedgerNotification::BlockSealed(summary.clone()));

        Ok(Some(summary))
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Submit an event
    pub async fn submit(&self, event: AssetEvent) -> Result<Hash256> {
        self.request(|response| LedgerMessage::Submit { event, response })
            .await?
    }

    /// Seal pending transactions now
    pub async fn seal(&self) -> Result<Option<SealedBlock>> {
        self.request(|response| LedgerMessage::Seal { response })
            .await?
    }

    /// Pending buffer size
    pub async fn pending_count(&self) -> Result<usize> {
        self.request(|response| LedgerMessage::PendingCount { response })
            .await
    }

    /// Current chain tip
    pub async fn tip(&self) -> Result<ChainTip> {
        self.request(|response| LedgerMessage::GetTip { response })
            .await
    }

    /// Final seal and stop the actor
    ///
    /// If the seal fails the actor stays up with its buffer intact and the
    /// call may be repeated.
    pub async fn shutdown(&self) -> Result<Option<SealedBlock>> {
        self.request(|response| LedgerMessage::Shutdown { response })
            .await?
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    tip: ChainTip,
    sealing: &SealingConfig,
    notifier: Notifier,
    metrics: Metrics,
) -> (LedgerHandle, JoinHandle<()>) {
    // Bounded channel for backpressure
    let (tx, rx) = mpsc::channel(sealing.mailbox_capacity);
    let actor = LedgerActor::new(storage, rx, tip, sealing, notifier, metrics);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (LedgerHandle::new(tx), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ZERO_HASH;
    use crate::types::ZoneRef;
    use crate::Config;

    fn spawn(
        sealing: SealingConfig,
    ) -> (LedgerHandle, JoinHandle<()>, Arc<Storage>, Notifier, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let genesis = Block::genesis(Utc::now());
        storage.put_genesis(&genesis, "{}").unwrap();

        let notifier = Notifier::new(64);
        let (handle, task) = spawn_ledger_actor(
            storage.clone(),
            ChainTip::from(&genesis),
            &sealing,
            notifier.clone(),
            Metrics::new().unwrap(),
        );
        (handle, task, storage, notifier, temp_dir)
    }

    fn no_timer(threshold: usize) -> SealingConfig {
        SealingConfig {
            max_transactions_per_block: threshold,
            timer_enabled: false,
            ..SealingConfig::default()
        }
    }

    fn movement(asset: u64, seq: u64) -> AssetEvent {
        AssetEvent::for_asset(asset)
            .with_event_type("movement")
            .with_movement(Some(ZoneRef::named(1, "Ward A")), Some(ZoneRef::named(2, "Ward B")))
            .with_metadata(serde_json::json!({ "seq": seq }))
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, task, _storage, _notifier, _temp) = spawn(no_timer(100));
        assert_eq!(handle.shutdown().await.unwrap(), None);
        task.await.unwrap();

        assert!(handle.pending_count().await.is_err());
    }

    #[tokio::test]
    async fn test_submit_then_seal() {
        let (handle, _task, storage, _notifier, _temp) = spawn(no_timer(100));

        let hash = handle.submit(movement(1, 0)).await.unwrap();
        assert_eq!(handle.pending_count().await.unwrap(), 1);
        assert!(storage.get_transaction(&hash).unwrap().is_none());

        let sealed = handle.seal().await.unwrap().unwrap();
        assert_eq!(sealed.block_number, 1);
        assert_eq!(sealed.transaction_count, 1);
        assert_eq!(handle.pending_count().await.unwrap(), 0);
        assert_eq!(handle.tip().await.unwrap().block_hash, sealed.block_hash);

        let row = storage.get_transaction(&hash).unwrap().unwrap();
        assert_eq!(row.block_number, 1);

        // Nothing pending: no empty block
        assert_eq!(handle.seal().await.unwrap(), None);
        assert_eq!(handle.tip().await.unwrap().block_number, 1);
    }

    #[tokio::test]
    async fn test_invalid_event_never_buffered() {
        let (handle, _task, _storage, _notifier, _temp) = spawn(no_timer(100));

        let err = handle.submit(AssetEvent::default()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransaction(_)));
        assert_eq!(handle.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_threshold_seal() {
        let (handle, _task, storage, _notifier, _temp) = spawn(no_timer(3));

        for seq in 0..3 {
            handle.submit(movement(1, seq)).await.unwrap();
        }
        assert_eq!(handle.pending_count().await.unwrap(), 0);
        let block = storage.get_block(1).unwrap().unwrap();
        assert_eq!(block.event_count, 3);

        handle.submit(movement(1, 3)).await.unwrap();
        assert_eq!(handle.pending_count().await.unwrap(), 1);
        assert!(storage.get_block(2).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_seal() {
        let sealing = SealingConfig {
            block_interval_ms: 30_000,
            ..SealingConfig::default()
        };
        let (handle, _task, storage, _notifier, _temp) = spawn(sealing);

        handle.submit(movement(4, 0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(29_000)).await;
        assert_eq!(handle.pending_count().await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(handle.pending_count().await.unwrap(), 0);
        assert_eq!(storage.get_block(1).unwrap().unwrap().event_count, 1);
    }

    #[tokio::test]
    async fn test_shutdown_seals_pending() {
        let (handle, task, storage, _notifier, _temp) = spawn(no_timer(100));

        handle.submit(movement(2, 0)).await.unwrap();
        handle.submit(movement(2, 1)).await.unwrap();

        let final_block = handle.shutdown().await.unwrap().unwrap();
        assert_eq!(final_block.transaction_count, 2);
        task.await.unwrap();

        assert_eq!(storage.get_latest_block().unwrap().unwrap().block_number, 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_pending() {
        let (handle, _task, storage, _notifier, _temp) = spawn(no_timer(100));

        let hash = handle.submit(movement(5, 0)).await.unwrap();
        handle.submit(movement(5, 1)).await.unwrap();

        // Plant a conflicting row so the seal trips the unique constraint
        let conflicting = Transaction::from_event(movement(5, 0), Utc::now()).unwrap();
        let row = crate::types::TransactionRow {
            block_number: 99,
            position: 0,
            transaction: conflicting,
        };
        storage.overwrite_transaction(&hash, &row).unwrap();

        let tip_before = handle.tip().await.unwrap();
        let err = handle.seal().await.unwrap_err();
        assert!(err.is_persistence_failure());
        assert_eq!(handle.pending_count().await.unwrap(), 2);
        assert_eq!(handle.tip().await.unwrap(), tip_before);
        assert!(storage.get_block(1).unwrap().is_none());

        // The ledger keeps accepting submissions
        handle.submit(movement(5, 2)).await.unwrap();
        assert_eq!(handle.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_shutdown_keeps_pending() {
        let (handle, task, storage, _notifier, _temp) = spawn(no_timer(100));

        let hash = handle.submit(movement(9, 0)).await.unwrap();
        handle.submit(movement(9, 1)).await.unwrap();

        let conflicting = Transaction::from_event(movement(9, 0), Utc::now()).unwrap();
        let row = crate::types::TransactionRow {
            block_number: 99,
            position: 0,
            transaction: conflicting,
        };
        storage.overwrite_transaction(&hash, &row).unwrap();

        let err = handle.shutdown().await.unwrap_err();
        assert!(err.is_persistence_failure());
        assert!(!task.is_finished());
        assert_eq!(handle.pending_count().await.unwrap(), 2);

        // Once the conflict is gone the retry seals everything and stops
        storage.delete_transaction(&hash).unwrap();
        let final_block = handle.shutdown().await.unwrap().unwrap();
        assert_eq!(final_block.transaction_count, 2);
        task.await.unwrap();

        assert!(storage.get_transaction(&hash).unwrap().is_some());
        assert!(handle.pending_count().await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        let genesis = Block::genesis(Utc::now());
        storage.put_genesis(&genesis, "{}").unwrap();

        let (_tx, rx) = mpsc::channel(1);
        let mut actor = LedgerActor::new(
            storage,
            rx,
            ChainTip::from(&genesis),
            &no_timer(100),
            Notifier::new(4),
            Metrics::new().unwrap(),
        );

        let tx = Transaction::from_event(movement(6, 0), Utc::now()).unwrap();
        actor.accept(tx.clone()).unwrap();
        assert!(matches!(
            actor.accept(tx.clone()),
            Err(Error::InvalidTransaction(_))
        ));

        // Still rejected once persisted
        actor.seal().unwrap().unwrap();
        assert!(matches!(actor.accept(tx), Err(Error::InvalidTransaction(_))));
        assert!(actor.pending.is_empty());
    }

    #[tokio::test]
    async fn test_notifications_published() {
        let (handle, _task, _storage, notifier, _temp) = spawn(no_timer(100));
        let mut rx = notifier.subscribe();

        let hash = handle.submit(movement(8, 0)).await.unwrap();
        handle.seal().await.unwrap();

        match rx.recv().await.unwrap() {
            LedgerNotification::TransactionAppended(tx) => assert_eq!(tx.transaction_hash, hash),
            other => panic!("unexpected notification: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            LedgerNotification::BlockSealed(block) => {
                assert_eq!(block.block_number, 1);
                assert_ne!(block.block_hash, ZERO_HASH);
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }
}
