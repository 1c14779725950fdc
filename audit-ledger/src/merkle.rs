//! Merkle tree over transaction hashes
//!
//! # Design
//!
//! - Binary tree built bottom-up, leaves in submission order
//! - Parent = SHA-256 of `left_hex ++ right_hex`
//! - An odd node at the end of a level is paired with itself
//! - Every leaf goes through at least one pairing, so a single leaf `h` yields
//!   `digest(h ++ h)`
//! - An empty leaf set yields `digest("empty")`, never the digest of empty input
//! - Inclusion proofs (O(log n)) for sealed transactions

use crate::crypto::{digest, Hash256};

/// Sentinel hashed for a block with no transactions
pub const EMPTY_SENTINEL: &str = "empty";

/// Hash a pair of nodes (used for internal nodes)
pub fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut joined = String::with_capacity(128);
    joined.push_str(&left.to_hex());
    joined.push_str(&right.to_hex());
    digest(joined)
}

/// Root of an empty leaf set
pub fn empty_root() -> Hash256 {
    digest(EMPTY_SENTINEL)
}

/// Compute the Merkle root of ordered leaves
///
/// Total work is at most `n` pair hashes plus one per odd level.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return empty_root();
    }

    let mut level = next_level(leaves);
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

fn next_level(level: &[Hash256]) -> Vec<Hash256> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            [single] => hash_pair(single, single),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Merkle proof (path from leaf to root)
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MerkleProof {
    /// Leaf hash being proven
    pub leaf_hash: Hash256,
    /// Position of the leaf in its block
    pub leaf_index: usize,
    /// Sibling hashes along the path to root
    pub siblings: Vec<(Direction, Hash256)>,
    /// Root hash
    pub root_hash: Hash256,
}

/// Direction of sibling in Merkle tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    /// Sibling is on the left
    Left,
    /// Sibling is on the right
    Right,
}

impl MerkleProof {
    /// Verify proof against its root hash
    pub fn verify(&self) -> bool {
        let mut current_hash = self.leaf_hash;

        for (direction, sibling_hash) in &self.siblings {
            current_hash = match direction {
                Direction::Left => hash_pair(sibling_hash, &current_hash),
                Direction::Right => hash_pair(&current_hash, sibling_hash),
            };
        }

        current_hash == self.root_hash
    }
}

/// Merkle tree over one block's transaction hashes
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    leaves: Vec<Hash256>,
}

impl MerkleTree {
    /// Create empty tree
    pub fn new() -> Self {
        Self { leaves: Vec::new() }
    }

    /// Create tree from existing leaves
    pub fn from_leaves(leaves: Vec<Hash256>) -> Self {
        Self { leaves }
    }

    /// Append a new leaf
    pub fn append(&mut self, leaf_hash: Hash256) {
        self.leaves.push(leaf_hash);
    }

    /// Get number of leaves
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Compute Merkle root
    pub fn root(&self) -> Hash256 {
        merkle_root(&self.leaves)
    }

    /// Generate Merkle proof for a leaf at given index
    pub fn generate_proof(&self, leaf_index: usize) -> Option<MerkleProof> {
        let leaf_hash = *self.leaves.get(leaf_index)?;
        let mut siblings = Vec::new();
        let mut current_level = self.leaves.clone();
        let mut current_index = leaf_index;

        loop {
            let is_left = current_index % 2 == 0;
            let sibling_index = if is_left {
                // No right neighbour: paired with itself
                (current_index + 1).min(current_level.len() - 1)
            } else {
                current_index - 1
            };

            let direction = if is_left {
                Direction::Right
            } else {
                Direction::Left
            };
            siblings.push((direction, current_level[sibling_index]));

            current_level = next_level(&current_level);
            current_index /= 2;

            if current_level.len() == 1 {
                break;
            }
        }

        Some(MerkleProof {
            leaf_hash,
            leaf_index,
            siblings,
            root_hash: current_level[0],
        })
    }

    /// Verify that a leaf exists in the tree at the given index
    pub fn verify_leaf(&self, leaf_index: usize, leaf_hash: Hash256) -> bool {
        match self.leaves.get(leaf_index) {
            Some(stored) if *stored == leaf_hash => {}
            _ => return false,
        }

        self.generate_proof(leaf_index)
            .map(|proof| proof.verify())
            .unwrap_or(false)
    }
}
