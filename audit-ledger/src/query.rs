//! Read-side queries over sealed data
//!
//! All queries read storage directly (never through the actor) and see only
//! sealed transactions. Listings are newest first.

use crate::crypto::Hash256;
use crate::storage::ReadView;
use crate::types::{AssetId, Block, Transaction, TransactionRow};
use crate::{Result, Storage};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default number of blocks in a listing
pub const DEFAULT_BLOCK_LIMIT: usize = 10;

/// Default number of entries in an asset history
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default number of recent transactions
pub const DEFAULT_RECENT_LIMIT: usize = 50;

/// Default number of search results
pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Chain summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    /// Height of the latest block (0 before anything is sealed)
    pub chain_height: u64,
    /// Hash of the latest block
    pub latest_block_hash: Option<Hash256>,
    /// Sealing time of the latest block
    pub latest_block_time: Option<DateTime<Utc>>,
    /// Sealed transactions
    pub total_transactions: u64,
    /// Sealed transactions stamped within the last 24 hours
    pub transactions_24h: u64,
    /// Transactions waiting in the buffer
    pub pending_transactions: usize,
}

/// Block with its transactions in sealing order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDetail {
    /// Header
    pub block: Block,
    /// Transactions
    pub transactions: Vec<Transaction>,
}

/// One entry of an asset's audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetHistoryEntry {
    /// The transaction
    pub transaction: Transaction,
    /// Sealing block height
    pub block_number: u64,
    /// Sealing block hash
    pub block_hash: Hash256,
    /// Sealing block time
    pub block_timestamp: DateTime<Utc>,
}

/// Transaction with the block that sealed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    /// The transaction
    pub transaction: Transaction,
    /// Sealing block height
    pub block_number: u64,
    /// Sealing block hash, absent if the block row is gone
    pub block_hash: Option<Hash256>,
}

/// Search criteria; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionFilter {
    /// Asset
    pub asset_id: Option<u64>,
    /// Exact event type
    pub event_type: Option<String>,
    /// Inclusive lower bound on the transaction timestamp
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the transaction timestamp
    pub to: Option<DateTime<Utc>>,
    /// Zone as source or destination
    pub zone_id: Option<u64>,
    /// Maximum results (default 100)
    pub limit: Option<usize>,
}

impl TransactionFilter {
    /// Filter for a single asset
    pub fn for_asset(asset_id: u64) -> Self {
        Self {
            asset_id: Some(asset_id),
            ..Default::default()
        }
    }

    /// Restrict to an event type
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Restrict to a time range (both ends inclusive)
    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Restrict to a zone
    pub fn in_zone(mut self, zone_id: u64) -> Self {
        self.zone_id = Some(zone_id);
        self
    }

    /// Cap the number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, tx: &Transaction) -> bool {
        if let Some(event_type) = &self.event_type {
            if &tx.event_type != event_type {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if tx.timestamp > *to {
                return false;
            }
        }
        if let Some(zone_id) = self.zone_id {
            if !tx.touches_zone(zone_id) {
                return false;
            }
        }
        true
    }
}

/// Memoized block lookups for a single query
struct BlockCache<'v, 'a> {
    view: &'v ReadView<'a>,
    blocks: HashMap<u64, Option<Block>>,
}

impl<'v, 'a> BlockCache<'v, 'a> {
    fn new(view: &'v ReadView<'a>) -> Self {
        Self {
            view,
            blocks: HashMap::new(),
        }
    }

    fn get(&mut self, block_number: u64) -> Result<Option<&Block>> {
        if !self.blocks.contains_key(&block_number) {
            let block = self.view.get_block(block_number)?;
            self.blocks.insert(block_number, block);
        }
        Ok(self.blocks.get(&block_number).and_then(Option::as_ref))
    }
}

/// Chain summary as of `now`
pub fn chain_status(storage: &Storage, pending: usize, now: DateTime<Utc>) -> Result<ChainStatus> {
    let view = storage.read_view();
    let latest = view.get_latest_block()?;

    Ok(ChainStatus {
        chain_height: latest.as_ref().map(|b| b.block_number).unwrap_or(0),
        latest_block_hash: latest.as_ref().map(|b| b.block_hash),
        latest_block_time: latest.as_ref().map(|b| b.timestamp),
        total_transactions: view.count_transactions()?,
        transactions_24h: view.count_transactions_since(&(now - Duration::hours(24)))?,
        pending_transactions: pending,
    })
}

/// Block by number with its transactions
pub fn block_detail(storage: &Storage, block_number: u64) -> Result<Option<BlockDetail>> {
    let view = storage.read_view();

    let block = match view.get_block(block_number)? {
        Some(block) => block,
        None => return Ok(None),
    };

    let transactions = view
        .block_transactions(block_number)?
        .into_iter()
        .map(|row| row.transaction)
        .collect();

    Ok(Some(BlockDetail {
        block,
        transactions,
    }))
}

/// Blocks newest first
pub fn list_blocks(storage: &Storage, limit: usize, offset: usize) -> Result<Vec<Block>> {
    storage.read_view().blocks_descending(limit, offset)
}

/// Audit trail of one asset, newest first
///
/// A zero asset id cannot exist on the chain and yields an empty trail.
pub fn asset_history(storage: &Storage, asset_id: u64, limit: usize) -> Result<Vec<AssetHistoryEntry>> {
    let asset_id = match AssetId::new(asset_id) {
        Ok(id) => id,
        Err(_) => return Ok(Vec::new()),
    };

    let view = storage.read_view();
    let mut blocks = BlockCache::new(&view);
    let mut history = Vec::new();

    for hash in view.asset_transaction_hashes(asset_id)? {
        if history.len() >= limit {
            break;
        }
        let row = match view.get_transaction(&hash?)? {
            Some(row) => row,
            None => continue,
        };
        // Inner join: rows whose block is gone are left out
        if let Some(block) = blocks.get(row.block_number)? {
            history.push(AssetHistoryEntry {
                block_number: block.block_number,
                block_hash: block.block_hash,
                block_timestamp: block.timestamp,
                transaction: row.transaction,
            });
        }
    }

    Ok(history)
}

/// Most recent sealed transactions
pub fn recent_transactions(storage: &Storage, limit: usize) -> Result<Vec<TransactionRecord>> {
    search(storage, &TransactionFilter::default().with_limit(limit))
}

/// Filtered search, newest first
pub fn search(storage: &Storage, filter: &TransactionFilter) -> Result<Vec<TransactionRecord>> {
    let limit = filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let view = storage.read_view();
    let mut blocks = BlockCache::new(&view);
    let mut records = Vec::new();

    if limit == 0 {
        return Ok(records);
    }

    let hashes: Box<dyn Iterator<Item = Result<Hash256>> + '_> = match filter.asset_id {
        Some(id) => match AssetId::new(id) {
            Ok(asset_id) => Box::new(view.asset_transaction_hashes(asset_id)?),
            Err(_) => return Ok(records),
        },
        None => Box::new(view.transaction_hashes_newest_first()?),
    };

    for hash in hashes {
        let row: TransactionRow = match view.get_transaction(&hash?)? {
            Some(row) => row,
            None => continue,
        };

        // Newest first, so everything after this is older still
        if let Some(from) = &filter.from {
            if row.transaction.timestamp < *from {
                break;
            }
        }

        if !filter.matches(&row.transaction) {
            continue;
        }

        let block_hash = blocks.get(row.block_number)?.map(|b| b.block_hash);
        records.push(TransactionRecord {
            transaction: row.transaction,
            block_number: row.block_number,
            block_hash,
        });

        if records.len() >= limit {
            break;
        }
    }

    Ok(records)
}
