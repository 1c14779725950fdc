//! Hashing primitives for the ledger
//!
//! This module provides:
//! - SHA-256 digests rendered as 64-char lowercase hex
//! - The all-zero sentinel used as the genesis `previous_hash`
//! - Canonical encodings (timestamps, JSON maps) shared by every higher-level hash
//!
//! Every digest in the ledger is computed over a canonical byte encoding, so
//! re-hashing unchanged stored fields always reproduces the stored digest.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// 256-bit digest
///
/// Serialized and displayed as lowercase hex. The hex form is what higher-level
/// hashes concatenate, not the raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256([u8; 32]);

/// All-zero digest (`"000…0"`, 64 chars), the genesis block's `previous_hash`
pub const ZERO_HASH: Hash256 = Hash256([0u8; 32]);

impl Hash256 {
    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering (64 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-char hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::Other(format!("Invalid digest '{}': {}", s, e)))?;
        Ok(Self(bytes))
    }

    /// Whether this is the all-zero sentinel
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 of arbitrary bytes
pub fn digest(data: impl AsRef<[u8]>) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    Hash256(hasher.finalize().into())
}

/// Canonical timestamp: RFC 3339, UTC, millisecond precision, `Z` suffix
///
/// Sub-millisecond precision is dropped so the encoding is stable whatever
/// clock resolution produced the value.
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Canonical JSON text of an opaque payload
///
/// Object keys come out sorted (serde_json's default map is ordered), arrays keep
/// their order, and no whitespace is emitted.
pub fn canonical_json(value: &serde_json::Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
