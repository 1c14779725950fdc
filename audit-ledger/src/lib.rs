//! Or-care-stra Audit Ledger
//!
//! Tamper-evident audit trail for hospital asset events: movements, status
//! changes and alerts are hashed, batched into hash-linked blocks with Merkle
//! roots, and verified end-to-end on demand.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task owns the pending buffer and the chain tip
//! - **Atomic Seals**: A block and all of its transactions commit in one RocksDB batch
//! - **Merkle Tree**: Per-block root over transaction hashes, with inclusion proofs
//! - **Direct Reads**: Queries and verification read storage snapshots, never the actor
//!
//! # Invariants
//!
//! - Every non-genesis block's `previous_hash` equals the previous block's `block_hash`
//! - A transaction is hashed once at submission and never mutated afterwards
//! - A failed seal leaves the buffer and the tip untouched
//! - Shutdown seals what is pending, or fails and keeps it for a retry

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod ledger;
pub mod merkle;
pub mod crypto;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;
pub mod events;
pub mod verify;
pub mod query;

// Re-exports
pub use error::{Error, Result};
pub use types::{AssetEvent, AssetId, Block, SealedBlock, Transaction, ZoneRef};
pub use crypto::Hash256;
pub use ledger::Ledger;
pub use config::Config;
pub use storage::Storage;
pub use events::LedgerNotification;
pub use query::{ChainStatus, TransactionFilter};
pub use verify::{TransactionVerification, VerificationFinding, VerificationReport};
