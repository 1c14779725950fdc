//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `blocks` - Sealed block headers (key: block_number, big-endian)
//! - `transactions` - Transaction rows (key: raw transaction hash)
//! - `indices` - Secondary indices for block membership, asset history,
//!   time order and block-hash uniqueness
//! - `meta` - Genesis payload and the running transaction count
//!
//! A seal is one `WriteBatch`: the block row, every transaction row and all
//! their index entries commit together or not at all.

use crate::{
    crypto::Hash256,
    error::{Error, Result},
    types::{AssetId, Block, Transaction, TransactionRow},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    ReadOptions, Snapshot, WriteBatch, DB,
};
use std::sync::Arc;

/// Column family names
const CF_BLOCKS: &str = "blocks";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";
const CF_META: &str = "meta";

/// Index key prefixes
const IDX_BLOCK_TX: u8 = b'b';
const IDX_ASSET: u8 = b'a';
const IDX_TIME: u8 = b't';
const IDX_BLOCK_HASH: u8 = b'h';

const META_GENESIS: &[u8] = b"genesis";
const META_TX_COUNT: &[u8] = b"tx_count";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.db.path()).finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        // Append-only workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BLOCKS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB audit store");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Seal

    /// Persist a sealed block and its transactions atomically
    ///
    /// Fails without writing anything if the block height is already taken or
    /// any hash collides with a persisted one.
    pub fn put_sealed_block(&self, block: &Block, transactions: &[Transaction]) -> Result<()> {
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_txs = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_meta = self.cf_handle(CF_META)?;

        let block_key = block.block_number.to_be_bytes();
        if self.db.get_pinned_cf(cf_blocks, block_key)?.is_some() {
            return Err(Error::Storage(format!(
                "block {} already exists",
                block.block_number
            )));
        }

        let hash_key = index_key_block_hash(&block.block_hash);
        if self.db.get_pinned_cf(cf_indices, &hash_key)?.is_some() {
            return Err(Error::Storage(format!(
                "unique constraint: block hash {} already exists",
                block.block_hash
            )));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_blocks, block_key, bincode::serialize(block)?);
        batch.put_cf(cf_indices, &hash_key, block_key);

        for (position, tx) in transactions.iter().enumerate() {
            let tx_key = tx.transaction_hash.as_bytes();
            if self.db.get_pinned_cf(cf_txs, tx_key)?.is_some() {
                return Err(Error::Storage(format!(
                    "unique constraint: transaction {} already exists",
                    tx.transaction_hash
                )));
            }

            let position = position as u32;
            let row = TransactionRow {
                block_number: block.block_number,
                position,
                transaction: tx.clone(),
            };
            batch.put_cf(cf_txs, tx_key, bincode::serialize(&row)?);
            batch.put_cf(
                cf_indices,
                index_key_block_tx(block.block_number, position),
                tx_key,
            );
            batch.put_cf(
                cf_indices,
                index_key_asset(tx.asset_id, &tx.timestamp, &tx.transaction_hash),
                b"",
            );
            batch.put_cf(
                cf_indices,
                index_key_time(&tx.timestamp, &tx.transaction_hash),
                b"",
            );
        }

        // Single writer: nothing else moves the count between read and commit
        let total = self.live_view().count_transactions()? + transactions.len() as u64;
        batch.put_cf(cf_meta, META_TX_COUNT, total.to_be_bytes());

        self.db.write(batch)?;

        tracing::debug!(
            block_number = block.block_number,
            event_count = block.event_count,
            "Block rows committed"
        );

        Ok(())
    }

    // Genesis payload

    /// Persist the genesis block together with its synthetic payload
    pub fn put_genesis(&self, block: &Block, payload: &str) -> Result<()> {
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_meta = self.cf_handle(CF_META)?;

        let block_key = block.block_number.to_be_bytes();
        if self.db.get_pinned_cf(cf_blocks, block_key)?.is_some() {
            return Err(Error::Storage("genesis block already exists".to_string()));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_blocks, block_key, bincode::serialize(block)?);
        batch.put_cf(cf_indices, index_key_block_hash(&block.block_hash), block_key);
        batch.put_cf(cf_meta, META_GENESIS, payload.as_bytes());
        batch.put_cf(cf_meta, META_TX_COUNT, 0u64.to_be_bytes());
        self.db.write(batch)?;

        Ok(())
    }

    /// Genesis payload, if the chain has been initialized
    pub fn get_genesis_payload(&self) -> Result<Option<String>> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, META_GENESIS)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| Error::Storage(format!("Corrupt genesis payload: {}", e))),
            None => Ok(None),
        }
    }

    // Reads

    /// Consistent read view over the current state
    pub fn read_view(&self) -> ReadView<'_> {
        ReadView {
            storage: self,
            snapshot: Some(self.db.snapshot()),
        }
    }

    /// Read view over the live database (no snapshot)
    pub fn live_view(&self) -> ReadView<'_> {
        ReadView {
            storage: self,
            snapshot: None,
        }
    }

    /// Get block by number
    pub fn get_block(&self, block_number: u64) -> Result<Option<Block>> {
        self.live_view().get_block(block_number)
    }

    /// Get latest block
    pub fn get_latest_block(&self) -> Result<Option<Block>> {
        self.live_view().get_latest_block()
    }

    /// Get transaction row by hash
    pub fn get_transaction(&self, hash: &Hash256) -> Result<Option<TransactionRow>> {
        self.live_view().get_transaction(hash)
    }

    // Raw writers for tamper tests

    #[cfg(test)]
    pub(crate) fn overwrite_block(&self, block: &Block) -> Result<()> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        self.db
            .put_cf(cf, block.block_number.to_be_bytes(), bincode::serialize(block)?)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn overwrite_transaction(&self, key: &Hash256, row: &TransactionRow) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        self.db.put_cf(cf, key.as_bytes(), bincode::serialize(row)?)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn delete_block(&self, block_number: u64) -> Result<()> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        self.db.delete_cf(cf, block_number.to_be_bytes())?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn delete_transaction(&self, hash: &Hash256) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        self.db.delete_cf(cf, hash.as_bytes())?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn delete_block_membership(&self, block_number: u64, position: u32) -> Result<()> {
        let cf = self.cf_handle(CF_INDICES)?;
        self.db.delete_cf(cf, index_key_block_tx(block_number, position))?;
        Ok(())
    }
}

/// Read-only view, optionally pinned to a snapshot
pub struct ReadView<'a> {
    storage: &'a Storage,
    snapshot: Option<Snapshot<'a>>,
}

impl std::fmt::Debug for ReadView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadView")
            .field("snapshot", &self.snapshot.is_some())
            .finish()
    }
}

impl<'a> ReadView<'a> {
    fn read_opts(&self) -> ReadOptions {
        let mut opts = ReadOptions::default();
        if let Some(snapshot) = &self.snapshot {
            opts.set_snapshot(snapshot);
        }
        opts
    }

    fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.storage.cf_handle(cf_name)?;
        Ok(self.storage.db.get_cf_opt(cf, key, &self.read_opts())?)
    }

    /// Iterate `(key, value)` pairs of a column family starting at `mode`
    fn scan(
        &self,
        cf_name: &str,
        mode: IteratorMode<'_>,
    ) -> Result<impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>> + '_> {
        let cf = self.storage.cf_handle(cf_name)?;
        let iter = self
            .storage
            .db
            .iterator_cf_opt(cf, self.read_opts(), mode)
            .map(|item| item.map_err(Error::from));
        Ok(iter)
    }

    /// Get block by number
    pub fn get_block(&self, block_number: u64) -> Result<Option<Block>> {
        match self.get(CF_BLOCKS, &block_number.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get latest block
    pub fn get_latest_block(&self) -> Result<Option<Block>> {
        match self.scan(CF_BLOCKS, IteratorMode::End)?.next() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(bincode::deserialize(&value)?))
            }
            None => Ok(None),
        }
    }

    /// All blocks, ascending by number
    pub fn blocks_ascending(&self) -> Result<impl Iterator<Item = Result<Block>> + '_> {
        Ok(self.scan(CF_BLOCKS, IteratorMode::Start)?.map(|item| -> Result<Block> {
            let (_, value) = item?;
            Ok(bincode::deserialize(&value)?)
        }))
    }

    /// Blocks newest first, skipping `offset`
    pub fn blocks_descending(&self, limit: usize, offset: usize) -> Result<Vec<Block>> {
        self.scan(CF_BLOCKS, IteratorMode::End)?
            .skip(offset)
            .take(limit)
            .map(|item| -> Result<Block> {
                let (_, value) = item?;
                Ok(bincode::deserialize(&value)?)
            })
            .collect()
    }

    /// Get transaction row by hash
    pub fn get_transaction(&self, hash: &Hash256) -> Result<Option<TransactionRow>> {
        match self.get(CF_TRANSACTIONS, hash.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether a transaction hash is persisted
    pub fn contains_transaction(&self, hash: &Hash256) -> Result<bool> {
        Ok(self.get(CF_TRANSACTIONS, hash.as_bytes())?.is_some())
    }

    /// Membership entries of a block in sealing order
    ///
    /// Each indexed hash is paired with the row stored under it, or `None` when
    /// that row is gone.
    pub fn block_members(
        &self,
        block_number: u64,
    ) -> Result<Vec<(Hash256, Option<TransactionRow>)>> {
        let prefix = index_prefix_block_tx(block_number);
        let mut members = Vec::new();

        for item in self.scan(CF_INDICES, IteratorMode::From(&prefix, Direction::Forward))? {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let hash = hash_from_slice(&value)?;
            members.push((hash, self.get_transaction(&hash)?));
        }

        Ok(members)
    }

    /// Transactions of a block in sealing order
    ///
    /// Rows are located through the membership index; each returned row is the
    /// one stored under the indexed hash, whatever its contents now are.
    pub fn block_transactions(&self, block_number: u64) -> Result<Vec<TransactionRow>> {
        self.block_members(block_number)?
            .into_iter()
            .map(|(hash, row)| {
                row.ok_or_else(|| {
                    Error::Storage(format!(
                        "index points at missing transaction {} in block {}",
                        hash, block_number
                    ))
                })
            })
            .collect()
    }

    /// Transaction hashes of an asset, newest first
    pub fn asset_transaction_hashes(
        &self,
        asset_id: AssetId,
    ) -> Result<impl Iterator<Item = Result<Hash256>> + '_> {
        let prefix = index_prefix_asset(asset_id);
        let mut upper = prefix.clone();
        upper.extend_from_slice(&[0xFF; 8 + 32 + 1]);
        let hash_offset = prefix.len() + 8;

        Ok(self
            .scan_owned(upper, Direction::Reverse)?
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(&prefix),
                Err(_) => true,
            })
            .map(move |item| -> Result<Hash256> {
                let (key, _) = item?;
                hash_from_slice(&key[hash_offset..])
            }))
    }

    /// All transaction hashes, newest first
    pub fn transaction_hashes_newest_first(
        &self,
    ) -> Result<impl Iterator<Item = Result<Hash256>> + '_> {
        let upper = vec![IDX_TIME, 0xFF];
        Ok(self
            .scan_owned(upper, Direction::Reverse)?
            .take_while(|item| match item {
                Ok((key, _)) => key.first() == Some(&IDX_TIME),
                Err(_) => true,
            })
            .map(|item| -> Result<Hash256> {
                let (key, _) = item?;
                hash_from_slice(&key[1 + 8..])
            }))
    }

    /// Transactions stamped at or after `since`
    pub fn count_transactions_since(&self, since: &DateTime<Utc>) -> Result<u64> {
        let lower = index_prefix_time(since);
        let mut count = 0u64;
        for item in self.scan(CF_INDICES, IteratorMode::From(&lower, Direction::Forward))? {
            let (key, _) = item?;
            if key.first() != Some(&IDX_TIME) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Total persisted transactions, as recorded by the last seal
    pub fn count_transactions(&self) -> Result<u64> {
        match self.get(CF_META, META_TX_COUNT)? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    Error::Storage(format!("Corrupt transaction count of {} bytes", bytes.len()))
                })?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    fn scan_owned(
        &self,
        from: Vec<u8>,
        direction: Direction,
    ) -> Result<impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>> + '_> {
        let cf = self.storage.cf_handle(CF_INDICES)?;
        let iter = self
            .storage
            .db
            .iterator_cf_opt(cf, self.read_opts(), IteratorMode::From(&from, direction))
            .map(|item| item.map_err(Error::from));
        Ok(iter)
    }
}

// Index key helpers

/// Order-preserving encoding of a millisecond timestamp
fn time_sort_key(ts: &DateTime<Utc>) -> [u8; 8] {
    ((ts.timestamp_millis() as u64) ^ (1u64 << 63)).to_be_bytes()
}

fn index_prefix_block_tx(block_number: u64) -> Vec<u8> {
    let mut key = vec![IDX_BLOCK_TX];
    key.extend_from_slice(&block_number.to_be_bytes());
    key
}

fn index_key_block_tx(block_number: u64, position: u32) -> Vec<u8> {
    let mut key = index_prefix_block_tx(block_number);
    key.extend_from_slice(&position.to_be_bytes());
    key
}

fn index_prefix_asset(asset_id: AssetId) -> Vec<u8> {
    let mut key = vec![IDX_ASSET];
    key.extend_from_slice(&asset_id.get().to_be_bytes());
    key
}

fn index_key_asset(asset_id: AssetId, ts: &DateTime<Utc>, hash: &Hash256) -> Vec<u8> {
    let mut key = index_prefix_asset(asset_id);
    key.extend_from_slice(&time_sort_key(ts));
    key.extend_from_slice(hash.as_bytes());
    key
}

fn index_prefix_time(ts: &DateTime<Utc>) -> Vec<u8> {
    let mut key = vec![IDX_TIME];
    key.extend_from_slice(&time_sort_key(ts));
    key
}

fn index_key_time(ts: &DateTime<Utc>, hash: &Hash256) -> Vec<u8> {
    let mut key = index_prefix_time(ts);
    key.extend_from_slice(hash.as_bytes());
    key
}

fn index_key_block_hash(hash: &Hash256) -> Vec<u8> {
    let mut key = vec![IDX_BLOCK_HASH];
    key.extend_from_slice(hash.as_bytes());
    key
}

fn hash_from_slice(bytes: &[u8]) -> Result<Hash256> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("Corrupt hash of {} bytes", bytes.len())))?;
    Ok(Hash256::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetEvent, ZoneRef};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()
    }

    fn tx(asset: u64, offset_secs: i64) -> Transaction {
        let event = AssetEvent::for_asset(asset)
            .with_event_type("movement")
            .with_movement(Some(ZoneRef::named(1, "Ward A")), Some(ZoneRef::named(2, "Ward B")));
        Transaction::from_event(event, base_time() + Duration::seconds(offset_secs)).unwrap()
    }

    fn block_for(number: u64, previous: Hash256, txs: &[Transaction]) -> Block {
        let leaves: Vec<Hash256> = txs.iter().map(|t| t.transaction_hash).collect();
        Block::seal(
            number,
            previous,
            crate::merkle::merkle_root(&leaves),
            base_time() + Duration::seconds(number as i64 * 30),
            txs.len() as u32,
        )
    }

    #[test]
    fn test_storage_open() {
        let (storage, _temp) = test_storage();
        assert!(storage.db.cf_handle(CF_BLOCKS).is_some());
        assert!(storage.db.cf_handle(CF_TRANSACTIONS).is_some());
        assert!(storage.db.cf_handle(CF_INDICES).is_some());
        assert!(storage.get_latest_block().unwrap().is_none());
    }

    #[test]
    fn test_put_and_read_sealed_block() {
        let (storage, _temp) = test_storage();
        let txs = vec![tx(1, 0), tx(2, 1), tx(1, 2)];
        let block = block_for(1, crate::crypto::ZERO_HASH, &txs);

        storage.put_sealed_block(&block, &txs).unwrap();

        assert_eq!(storage.get_block(1).unwrap(), Some(block.clone()));
        assert_eq!(storage.get_latest_block().unwrap(), Some(block));

        let row = storage.get_transaction(&txs[1].transaction_hash).unwrap().unwrap();
        assert_eq!(row.block_number, 1);
        assert_eq!(row.position, 1);

        let view = storage.read_view();
        let rows = view.block_transactions(1).unwrap();
        let hashes: Vec<Hash256> = rows.iter().map(|r| r.transaction.transaction_hash).collect();
        let expected: Vec<Hash256> = txs.iter().map(|t| t.transaction_hash).collect();
        assert_eq!(hashes, expected);
        assert_eq!(view.count_transactions().unwrap(), 3);
    }

    #[test]
    fn test_duplicate_transaction_rejected_atomically() {
        let (storage, _temp) = test_storage();
        let first = vec![tx(1, 0)];
        let block1 = block_for(1, crate::crypto::ZERO_HASH, &first);
        storage.put_sealed_block(&block1, &first).unwrap();

        let second = vec![tx(2, 5), tx(1, 0)];
        let block2 = block_for(2, block1.block_hash, &second);
        let err = storage.put_sealed_block(&block2, &second).unwrap_err();
        assert!(err.to_string().contains("unique constraint"));

        // Nothing from the failed batch is visible
        assert!(storage.get_block(2).unwrap().is_none());
        assert!(storage.get_transaction(&second[0].transaction_hash).unwrap().is_none());
    }

    #[test]
    fn test_transaction_count_follows_seals() {
        let (storage, _temp) = test_storage();
        let genesis = Block::genesis(base_time());
        storage.put_genesis(&genesis, "{}").unwrap();
        assert_eq!(storage.read_view().count_transactions().unwrap(), 0);

        let first = vec![tx(1, 0), tx(2, 1)];
        let block1 = block_for(1, genesis.block_hash, &first);
        storage.put_sealed_block(&block1, &first).unwrap();

        let second = vec![tx(3, 2), tx(4, 3), tx(5, 4)];
        let block2 = block_for(2, block1.block_hash, &second);
        storage.put_sealed_block(&block2, &second).unwrap();
        assert_eq!(storage.read_view().count_transactions().unwrap(), 5);

        // A rejected batch leaves the count alone
        let clash = vec![tx(6, 5), tx(1, 0)];
        let block3 = block_for(3, block2.block_hash, &clash);
        assert!(storage.put_sealed_block(&block3, &clash).is_err());
        assert_eq!(storage.read_view().count_transactions().unwrap(), 5);
    }

    #[test]
    fn test_block_members_report_missing_rows() {
        let (storage, _temp) = test_storage();
        let txs = vec![tx(1, 0), tx(2, 1)];
        let block = block_for(1, crate::crypto::ZERO_HASH, &txs);
        storage.put_sealed_block(&block, &txs).unwrap();

        storage.delete_transaction(&txs[0].transaction_hash).unwrap();

        let members = storage.read_view().block_members(1).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].0, txs[0].transaction_hash);
        assert!(members[0].1.is_none());
        assert!(members[1].1.is_some());
        assert!(storage.read_view().block_transactions(1).is_err());
    }

    #[test]
    fn test_block_height_taken() {
        let (storage, _temp) = test_storage();
        let txs = vec![tx(1, 0)];
        let block = block_for(1, crate::crypto::ZERO_HASH, &txs);
        storage.put_sealed_block(&block, &txs).unwrap();

        let other = vec![tx(3, 9)];
        let clash = block_for(1, crate::crypto::ZERO_HASH, &other);
        assert!(storage.put_sealed_block(&clash, &other).is_err());
    }

    #[test]
    fn test_asset_index_newest_first() {
        let (storage, _temp) = test_storage();
        let txs = vec![tx(7, 0), tx(8, 1), tx(7, 2), tx(70, 3)];
        let block = block_for(1, crate::crypto::ZERO_HASH, &txs);
        storage.put_sealed_block(&block, &txs).unwrap();

        let view = storage.read_view();
        let hashes: Vec<Hash256> = view
            .asset_transaction_hashes(AssetId::new(7).unwrap())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(hashes, vec![txs[2].transaction_hash, txs[0].transaction_hash]);

        let all: Vec<Hash256> = view
            .transaction_hashes_newest_first()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0], txs[3].transaction_hash);
    }

    #[test]
    fn test_count_since() {
        let (storage, _temp) = test_storage();
        let txs = vec![tx(1, 0), tx(1, 60), tx(1, 120)];
        let block = block_for(1, crate::crypto::ZERO_HASH, &txs);
        storage.put_sealed_block(&block, &txs).unwrap();

        let view = storage.read_view();
        assert_eq!(view.count_transactions_since(&(base_time() + Duration::seconds(60))).unwrap(), 2);
        assert_eq!(view.count_transactions_since(&(base_time() - Duration::days(1))).unwrap(), 3);
    }

    #[test]
    fn test_snapshot_isolation() {
        let (storage, _temp) = test_storage();
        let view = storage.read_view();

        let txs = vec![tx(1, 0)];
        let block = block_for(1, crate::crypto::ZERO_HASH, &txs);
        storage.put_sealed_block(&block, &txs).unwrap();

        assert!(view.get_block(1).unwrap().is_none());
        assert!(storage.read_view().get_block(1).unwrap().is_some());
    }

    #[test]
    fn test_genesis_written_with_payload() {
        let (storage, _temp) = test_storage();
        assert!(storage.get_genesis_payload().unwrap().is_none());

        let genesis = Block::genesis(base_time());
        storage.put_genesis(&genesis, r#"{"message":"hi"}"#).unwrap();

        assert_eq!(storage.get_block(0).unwrap(), Some(genesis.clone()));
        assert_eq!(
            storage.get_genesis_payload().unwrap().as_deref(),
            Some(r#"{"message":"hi"}"#)
        );
        assert!(storage.put_genesis(&genesis, "{}").is_err());
    }

    #[test]
    fn test_time_sort_key_orders_pre_epoch() {
        let before = Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap();
        assert!(time_sort_key(&before) < time_sort_key(&after));
    }
}
