//! Chain verification
//!
//! Recomputes every digest from stored rows and compares it with what was
//! stored at sealing time. Verification reads through a storage snapshot, so it
//! can run while the actor keeps sealing.
//!
//! # Checks, per block in ascending order
//!
//! 1. `block_hash` recomputed from the header fields
//! 2. `previous_hash` against the previous block's stored hash
//! 3. `merkle_root` recomputed from the block's transactions, each transaction
//!    hash itself recomputed from the stored fields (skipped only when the block
//!    records zero transactions and none are indexed under it)
//!
//! Mismatches are reported as findings; only storage faults are errors. Missing
//! transaction rows or membership entries are mismatches too: the root is
//! recomputed over whatever is still readable, and a short count always counts
//! as a Merkle mismatch.

use crate::crypto::Hash256;
use crate::merkle::{merkle_root, MerkleProof, MerkleTree};
use crate::types::{Block, Transaction};
use crate::{Result, Storage};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single integrity violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationFinding {
    /// Header no longer hashes to its stored `block_hash`
    BlockHashMismatch {
        /// Block height
        block_number: u64,
        /// Stored hash
        expected: Hash256,
        /// Recomputed hash
        computed: Hash256,
    },

    /// `previous_hash` does not match the previous block
    ChainLinkageBroken {
        /// Height of the block whose link is broken
        block_number: u64,
        /// Stored hash of the previous block
        expected: Hash256,
        /// `previous_hash` found in this block
        found: Hash256,
    },

    /// Transactions no longer hash to the stored Merkle root
    MerkleRootMismatch {
        /// Block height
        block_number: u64,
        /// Stored root
        expected: Hash256,
        /// Root over the recomputed transaction hashes
        computed: Hash256,
    },
}

impl VerificationFinding {
    /// Block the finding refers to
    pub fn block_number(&self) -> u64 {
        match self {
            Self::BlockHashMismatch { block_number, .. }
            | Self::ChainLinkageBroken { block_number, .. }
            | Self::MerkleRootMismatch { block_number, .. } => *block_number,
        }
    }
}

/// Result of a full chain walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// True when no finding was recorded
    pub valid: bool,
    /// Number of blocks walked, genesis included
    pub blocks_verified: u64,
    /// Integrity violations in block order
    pub findings: Vec<VerificationFinding>,
}

/// Location of a verified transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockRef {
    /// Block height
    pub number: u64,
    /// Block hash
    pub hash: Hash256,
    /// Sealing time
    pub timestamp: DateTime<Utc>,
}

impl From<&Block> for BlockRef {
    fn from(block: &Block) -> Self {
        Self {
            number: block.block_number,
            hash: block.block_hash,
            timestamp: block.timestamp,
        }
    }
}

/// Outcome of verifying one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionVerification {
    /// Stored fields still hash to the stored hash and the block exists
    Valid {
        /// The transaction as stored
        transaction: Transaction,
        /// Owning block
        block: BlockRef,
    },

    /// No sealed transaction with this hash
    NotFound,

    /// Stored fields hash to something else
    HashMismatch {
        /// Stored hash
        stored: Hash256,
        /// Hash recomputed from the stored fields
        computed: Hash256,
    },

    /// The row points at a block that is not stored
    BlockMissing {
        /// Height recorded in the transaction row
        block_number: u64,
    },
}

impl TransactionVerification {
    /// Whether the transaction verified
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Walk the whole chain and recompute every digest
pub fn verify_chain(storage: &Storage) -> Result<VerificationReport> {
    let view = storage.read_view();
    let mut findings = Vec::new();
    let mut blocks_verified = 0u64;
    let mut previous: Option<Hash256> = None;

    for block in view.blocks_ascending()? {
        let block = block?;

        let computed = block.compute_hash();
        if computed != block.block_hash {
            findings.push(VerificationFinding::BlockHashMismatch {
                block_number: block.block_number,
                expected: block.block_hash,
                computed,
            });
        }

        if let Some(expected) = previous {
            if block.previous_hash != expected {
                findings.push(VerificationFinding::ChainLinkageBroken {
                    block_number: block.block_number,
                    expected,
                    found: block.previous_hash,
                });
            }
        }

        let members = view.block_members(block.block_number)?;
        if block.event_count > 0 || !members.is_empty() {
            let leaves: Vec<Hash256> = members
                .iter()
                .filter_map(|(_, row)| row.as_ref())
                .map(|row| row.transaction.compute_hash())
                .collect();
            let computed = merkle_root(&leaves);
            if computed != block.merkle_root || leaves.len() != block.event_count as usize {
                tracing::debug!(
                    block_number = block.block_number,
                    indexed = members.len(),
                    readable = leaves.len(),
                    recorded = block.event_count,
                    "Merkle check failed"
                );
                findings.push(VerificationFinding::MerkleRootMismatch {
                    block_number: block.block_number,
                    expected: block.merkle_root,
                    computed,
                });
            }
        }

        previous = Some(block.block_hash);
        blocks_verified += 1;
    }

    let report = VerificationReport {
        valid: findings.is_empty(),
        blocks_verified,
        findings,
    };

    if report.valid {
        tracing::info!(blocks_verified, "Chain verified");
    } else {
        tracing::warn!(
            blocks_verified,
            findings = report.findings.len(),
            "Chain verification found integrity violations"
        );
    }

    Ok(report)
}

/// Verify one sealed transaction and locate its block
pub fn verify_transaction(storage: &Storage, hash: &Hash256) -> Result<TransactionVerification> {
    let view = storage.read_view();

    let row = match view.get_transaction(hash)? {
        Some(row) => row,
        None => return Ok(TransactionVerification::NotFound),
    };

    let computed = row.transaction.compute_hash();
    if computed != row.transaction.transaction_hash || computed != *hash {
        return Ok(TransactionVerification::HashMismatch {
            stored: row.transaction.transaction_hash,
            computed,
        });
    }

    match view.get_block(row.block_number)? {
        Some(block) => Ok(TransactionVerification::Valid {
            transaction: row.transaction,
            block: BlockRef::from(&block),
        }),
        None => Ok(TransactionVerification::BlockMissing {
            block_number: row.block_number,
        }),
    }
}

/// Merkle inclusion proof for a sealed transaction
///
/// Built from the stored leaf hashes of the owning block; the proof root equals
/// the block's `merkle_root` as long as the block is intact.
pub fn transaction_proof(storage: &Storage, hash: &Hash256) -> Result<Option<MerkleProof>> {
    let view = storage.read_view();

    let row = match view.get_transaction(hash)? {
        Some(row) => row,
        None => return Ok(None),
    };

    let leaves = view
        .block_transactions(row.block_number)?
        .into_iter()
        .map(|r| r.transaction.transaction_hash)
        .collect();

    Ok(MerkleTree::from_leaves(leaves).generate_proof(row.position as usize))
}
