//! Blake3 hashing utilities for the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A named alias for a 32-byte array, used to represent a 256-bit hash.
pub type H256 = [u8; 32];

/// Errors raised when parsing a hash from its textual form.
#[derive(Debug, Error)]
pub enum HashParseError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("hash must be 32 bytes, got {0}")]
    WrongLength(usize),
}

/// A 256-bit Blake3 hash with hex formatting.
///
/// The all-zero hash doubles as the genesis sentinel: the block at height 0
/// links to `Hash::ZERO` instead of a predecessor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hash(pub H256);

impl Hash {
    /// The zero hash, used as the genesis sentinel.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: H256) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &H256 {
        &self.0
    }

    /// Convert to a lowercase hex string (no prefix).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| HashParseError::InvalidHex)?;
        if bytes.len() != 32 {
            return Err(HashParseError::WrongLength(bytes.len()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(0x{})", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl From<H256> for Hash {
    fn from(bytes: H256) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hash arbitrary bytes with Blake3.
pub fn hash(data: &[u8]) -> Hash {
    Hash(blake3::hash(data).into())
}

/// Hash a serializable value through its deterministic bincode encoding.
///
/// Bincode encodes fixed-width integers and length-prefixed sequences with
/// no map iteration involved, so the same logical value always produces the
/// same bytes. This is what makes block hashes reproducible bit-for-bit
/// from persisted state.
pub fn hash_value<T: serde::Serialize>(value: &T) -> Hash {
    let encoded = bincode::serialize(value).expect("bincode serialization is infallible here");
    hash(&encoded)
}
