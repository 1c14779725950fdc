//! Core types for the audit ledger
//!
//! All hashed types are designed for:
//! - Deterministic canonical encoding (stable field order, millisecond timestamps)
//! - Immutability once hashed (no setters, fields are only read after sealing)
//! - Compact row storage (bincode)

use crate::crypto::{canonical_json, canonical_timestamp, digest, Hash256, ZERO_HASH};
use crate::merkle::empty_root;
use crate::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hospital asset identifier (positive integer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(u64);

impl AssetId {
    /// Create asset ID, rejecting the zero placeholder
    pub fn new(id: u64) -> Result<Self> {
        if id == 0 {
            return Err(Error::InvalidTransaction(
                "asset_id must be a positive integer".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Numeric value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zone reference (id + display name)
///
/// Only the id is audit-relevant; the name is carried for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRef {
    /// Zone id
    pub id: u64,
    /// Display name
    pub name: Option<String>,
}

impl ZoneRef {
    /// Create zone reference with a display name
    pub fn named(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }
}

/// Event type used when the producer leaves it out
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

/// Raw event as submitted by a producer (API handler, IoT simulator)
///
/// Everything except `asset_id` is optional and gets defaulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetEvent {
    /// Event type (e.g. `movement`, `theft_alert`)
    #[serde(default)]
    pub event_type: Option<String>,

    /// Asset identifier (required)
    #[serde(default)]
    pub asset_id: Option<u64>,

    /// Human-readable asset tag
    #[serde(default)]
    pub asset_tag: Option<String>,

    /// Zone the asset left
    #[serde(default)]
    pub from_zone: Option<ZoneRef>,

    /// Zone the asset entered
    #[serde(default)]
    pub to_zone: Option<ZoneRef>,

    /// Opaque payload, not interpreted by the ledger
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl AssetEvent {
    /// Event for an asset with everything else defaulted
    pub fn for_asset(asset_id: u64) -> Self {
        Self {
            asset_id: Some(asset_id),
            ..Default::default()
        }
    }

    /// Set event type
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Set asset tag
    pub fn with_asset_tag(mut self, tag: impl Into<String>) -> Self {
        self.asset_tag = Some(tag.into());
        self
    }

    /// Set zone transition
    pub fn with_movement(mut self, from: Option<ZoneRef>, to: Option<ZoneRef>) -> Self {
        self.from_zone = from;
        self.to_zone = to;
        self
    }

    /// Set metadata payload
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One audited event (ledger transaction)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Submission time (millisecond precision)
    pub timestamp: DateTime<Utc>,

    /// Event type
    pub event_type: String,

    /// Asset the event is about
    pub asset_id: AssetId,

    /// Asset tag (display only)
    pub asset_tag: Option<String>,

    /// Zone the asset left
    pub from_zone: Option<ZoneRef>,

    /// Zone the asset entered
    pub to_zone: Option<ZoneRef>,

    /// Canonical JSON text of the event payload
    pub event_data: String,

    /// Digest over the canonical subset of the fields above
    pub transaction_hash: Hash256,
}

/// Canonical encoding of the hashed transaction fields, in hashing order
#[derive(Serialize)]
struct TransactionPreimage<'a> {
    timestamp: String,
    event_type: &'a str,
    asset_id: u64,
    from_zone_id: Option<u64>,
    to_zone_id: Option<u64>,
    event_data: &'a str,
}

impl Transaction {
    /// Build a transaction from a raw event, stamping it with `timestamp`
    pub fn from_event(event: AssetEvent, timestamp: DateTime<Utc>) -> Result<Self> {
        let asset_id = event
            .asset_id
            .ok_or_else(|| Error::InvalidTransaction("asset_id is required".to_string()))
            .and_then(AssetId::new)?;

        let event_type = event
            .event_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_EVENT_TYPE.to_string());

        let metadata = event
            .metadata
            .filter(|m| !m.is_null())
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

        let mut tx = Self {
            timestamp: timestamp.trunc_subsecs(3),
            event_type,
            asset_id,
            asset_tag: event.asset_tag,
            from_zone: event.from_zone,
            to_zone: event.to_zone,
            event_data: canonical_json(&metadata)?,
            transaction_hash: ZERO_HASH,
        };
        tx.transaction_hash = tx.compute_hash();
        Ok(tx)
    }

    /// Canonical bytes covered by `transaction_hash`
    ///
    /// Excludes the hash itself and display-only fields (asset tag, zone names).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let preimage = TransactionPreimage {
            timestamp: canonical_timestamp(&self.timestamp),
            event_type: &self.event_type,
            asset_id: self.asset_id.get(),
            from_zone_id: self.from_zone.as_ref().map(|z| z.id),
            to_zone_id: self.to_zone.as_ref().map(|z| z.id),
            event_data: &self.event_data,
        };
        serde_json::to_vec(&preimage).expect("plain struct serialization cannot fail")
    }

    /// Recompute the transaction hash from the stored fields
    pub fn compute_hash(&self) -> Hash256 {
        digest(self.canonical_bytes())
    }

    /// Whether the transaction touches a zone as source or destination
    pub fn touches_zone(&self, zone_id: u64) -> bool {
        self.from_zone.as_ref().map(|z| z.id) == Some(zone_id)
            || self.to_zone.as_ref().map(|z| z.id) == Some(zone_id)
    }
}

/// Sealed block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height (0 = genesis)
    pub block_number: u64,

    /// Sealing time (millisecond precision)
    pub timestamp: DateTime<Utc>,

    /// Hash of previous block (all zeros for genesis)
    pub previous_hash: Hash256,

    /// Merkle root of the block's transaction hashes
    pub merkle_root: Hash256,

    /// Sealing-round counter, always 0 (no proof-of-work)
    pub nonce: u64,

    /// Hash of this block's header
    pub block_hash: Hash256,

    /// Number of transactions
    pub event_count: u32,
}

impl Block {
    /// Seal a header: fills in `block_hash` from the other fields
    pub fn seal(
        block_number: u64,
        previous_hash: Hash256,
        merkle_root: Hash256,
        timestamp: DateTime<Utc>,
        event_count: u32,
    ) -> Self {
        let mut block = Self {
            block_number,
            timestamp: timestamp.trunc_subsecs(3),
            previous_hash,
            merkle_root,
            nonce: 0,
            block_hash: ZERO_HASH,
            event_count,
        };
        block.block_hash = block.compute_hash();
        block
    }

    /// Genesis block: height 0, zero previous hash, no transactions
    pub fn genesis(timestamp: DateTime<Utc>) -> Self {
        Self::seal(0, ZERO_HASH, empty_root(), timestamp, 0)
    }

    /// Compute block hash over `number ++ previous ++ merkle ++ timestamp ++ nonce`
    ///
    /// Both digests are fixed-width hex and the timestamp is fixed-format, so
    /// the plain concatenation is unambiguous.
    pub fn compute_hash(&self) -> Hash256 {
        let preimage = format!(
            "{}{}{}{}{}",
            self.block_number,
            self.previous_hash.to_hex(),
            self.merkle_root.to_hex(),
            canonical_timestamp(&self.timestamp),
            self.nonce
        );
        digest(preimage)
    }
}

/// Summary returned by a successful seal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlock {
    /// Block height
    pub block_number: u64,
    /// Block hash
    pub block_hash: Hash256,
    /// Merkle root
    pub merkle_root: Hash256,
    /// Number of sealed transactions
    pub transaction_count: u32,
    /// Sealing time
    pub timestamp: DateTime<Utc>,
}

impl From<&Block> for SealedBlock {
    fn from(block: &Block) -> Self {
        Self {
            block_number: block.block_number,
            block_hash: block.block_hash,
            merkle_root: block.merkle_root,
            transaction_count: block.event_count,
            timestamp: block.timestamp,
        }
    }
}

/// Persisted transaction row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    /// Owning block
    pub block_number: u64,
    /// Position inside the block (Merkle leaf index)
    pub position: u32,
    /// The transaction
    pub transaction: Transaction,
}
