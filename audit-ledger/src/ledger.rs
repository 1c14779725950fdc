//! Main ledger orchestration layer
//!
//! This module ties together storage, the single-writer actor, verification
//! and queries into the high-level API used by producers and consumers.
//!
//! # Example
//!
//! ```no_run
//! use audit_ledger::{AssetEvent, Config, Ledger, ZoneRef};
//!
//! #[tokio::main]
//! async fn main() -> audit_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     let event = AssetEvent::for_asset(42)
//!         .with_event_type("movement")
//!         .with_movement(Some(ZoneRef::named(1, "ICU")), Some(ZoneRef::named(2, "Theatre 3")));
//!     let hash = ledger.submit(event).await?;
//!
//!     ledger.seal().await?;
//!     assert!(ledger.verify_transaction(&hash)?.is_valid());
//!
//!     ledger.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, ChainTip, LedgerHandle},
    crypto::{canonical_json, canonical_timestamp, Hash256},
    events::{LedgerNotification, Notifier},
    merkle::MerkleProof,
    metrics::Metrics,
    query::{
        self, AssetHistoryEntry, BlockDetail, ChainStatus, TransactionFilter, TransactionRecord,
        DEFAULT_BLOCK_LIMIT, DEFAULT_HISTORY_LIMIT, DEFAULT_RECENT_LIMIT,
    },
    types::{AssetEvent, Block, SealedBlock},
    verify::{self, TransactionVerification, VerificationReport},
    Config, Error, Result, Storage,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for writes
    handle: LedgerHandle,

    /// Actor task, taken and awaited once shutdown succeeds
    task: Mutex<Option<JoinHandle<()>>>,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Outbound notifications
    notifier: Notifier,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// Creates the genesis block on an empty store, then resumes sealing from
    /// the last persisted block.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(Storage::open(&config)?);

        let tip = match storage.get_latest_block()? {
            Some(latest) => {
                tracing::info!(
                    block_number = latest.block_number,
                    block_hash = %latest.block_hash,
                    "Resuming chain"
                );
                latest
            }
            None => Self::create_genesis(&storage, &config)?,
        };

        let metrics = Metrics::new().map_err(|e| Error::Other(format!("Metrics: {}", e)))?;
        let notifier = Notifier::new(config.notifications.channel_capacity);

        let (handle, task) = spawn_ledger_actor(
            storage.clone(),
            ChainTip::from(&tip),
            &config.sealing,
            notifier.clone(),
            metrics.clone(),
        );

        Ok(Self {
            handle,
            task: Mutex::new(Some(task)),
            storage,
            notifier,
            metrics,
            config,
        })
    }

    fn create_genesis(storage: &Storage, config: &Config) -> Result<Block> {
        let genesis = Block::genesis(Utc::now());

        let payload = serde_json::json!({
            "message": config.genesis.message,
            "hospital": config.genesis.hospital,
            "purpose": config.genesis.purpose,
            "created": canonical_timestamp(&genesis.timestamp),
        });
        storage.put_genesis(&genesis, &canonical_json(&payload)?)?;

        tracing::info!(block_hash = %genesis.block_hash, "Genesis block created");
        Ok(genesis)
    }

    // Writes

    /// Submit an event, returning its transaction hash
    ///
    /// The transaction is pending until the next seal.
    pub async fn submit(&self, event: AssetEvent) -> Result<Hash256> {
        self.handle.submit(event).await
    }

    /// Seal pending transactions now
    ///
    /// Returns `None` when nothing is pending.
    pub async fn seal(&self) -> Result<Option<SealedBlock>> {
        self.handle.seal().await
    }

    /// Final seal and stop the actor
    ///
    /// On a persistence failure the pending transactions stay buffered and the
    /// ledger keeps accepting calls, so shutdown can be retried. After success
    /// writes fail; drop the ledger to release the store.
    pub async fn shutdown(&self) -> Result<Option<SealedBlock>> {
        let sealed = self.handle.shutdown().await?;
        if let Some(task) = self.task.lock().await.take() {
            task.await
                .map_err(|e| Error::Concurrency(format!("Ledger actor panicked: {}", e)))?;
        }

        tracing::info!(service = %self.config.service_name, "Ledger shut down");
        Ok(sealed)
    }

    // Chain state

    /// Last sealed block as seen by the writer
    pub async fn tip(&self) -> Result<ChainTip> {
        self.handle.tip().await
    }

    /// Transactions waiting for the next seal
    pub async fn pending_count(&self) -> Result<usize> {
        self.handle.pending_count().await
    }

    /// Chain summary
    pub async fn status(&self) -> Result<ChainStatus> {
        let pending = self.handle.pending_count().await?;
        query::chain_status(&self.storage, pending, Utc::now())
    }

    /// Genesis payload as stored at chain creation
    pub fn genesis_payload(&self) -> Result<Option<serde_json::Value>> {
        match self.storage.get_genesis_payload()? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    // Queries

    /// Block by number with its transactions
    pub fn get_block(&self, block_number: u64) -> Result<Option<BlockDetail>> {
        query::block_detail(&self.storage, block_number)
    }

    /// Blocks newest first (default limit 10)
    pub fn list_blocks(&self, limit: Option<usize>, offset: usize) -> Result<Vec<Block>> {
        query::list_blocks(&self.storage, limit.unwrap_or(DEFAULT_BLOCK_LIMIT), offset)
    }

    /// Audit trail of one asset, newest first (default limit 50)
    pub fn asset_history(&self, asset_id: u64, limit: Option<usize>) -> Result<Vec<AssetHistoryEntry>> {
        query::asset_history(&self.storage, asset_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
    }

    /// Most recent sealed transactions (default limit 50)
    pub fn recent_transactions(&self, limit: Option<usize>) -> Result<Vec<TransactionRecord>> {
        query::recent_transactions(&self.storage, limit.unwrap_or(DEFAULT_RECENT_LIMIT))
    }

    /// Filtered search (default limit 100)
    pub fn search(&self, filter: &TransactionFilter) -> Result<Vec<TransactionRecord>> {
        query::search(&self.storage, filter)
    }

    // Verification

    /// Recompute every hash on the chain
    ///
    /// Reads a snapshot; safe to call while the ledger keeps sealing.
    pub fn verify(&self) -> Result<VerificationReport> {
        verify::verify_chain(&self.storage)
    }

    /// Verify one sealed transaction
    pub fn verify_transaction(&self, hash: &Hash256) -> Result<TransactionVerification> {
        verify::verify_transaction(&self.storage, hash)
    }

    /// Merkle inclusion proof for a sealed transaction
    pub fn transaction_proof(&self, hash: &Hash256) -> Result<Option<MerkleProof>> {
        verify::transaction_proof(&self.storage, hash)
    }

    // Observability

    /// Register a notification listener
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerNotification> {
        self.notifier.subscribe()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }
}
