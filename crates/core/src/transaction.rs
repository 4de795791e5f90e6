//! Notarization transactions.
//!
//! A transaction asks the ledger to record that a piece of published content
//! (a blog post or a static page) had a given content hash at a given time.
//! Transactions carry no value and have no sender: authorship is established
//! once, at the block level, by the proposer signature.

use crate::hash::Hash;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors raised when a transaction payload fails shape validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("slug must not be empty")]
    EmptySlug,

    #[error("slug contains invalid characters: {0:?}")]
    InvalidSlug(String),

    #[error("page path must start with '/'")]
    InvalidPath(String),

    #[error("content hash must not be the zero hash")]
    ZeroContentHash,
}

/// An opaque transaction identifier, assigned at admission.
///
/// 128 random bits from the OS entropy source. Uniqueness across the mempool
/// and the committed chain is enforced by the ledger, not by this type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub [u8; 16]);

impl TxId {
    /// Draw a fresh random id.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.to_hex())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The closed set of transaction kinds the ledger accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    NotarizePost,
    NotarizePage,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxKind::NotarizePost => write!(f, "notarize_post"),
            TxKind::NotarizePage => write!(f, "notarize_page"),
        }
    }
}

/// Kind-specific transaction data.
///
/// Kind and payload live in one enum, so a payload of the wrong shape for
/// its kind is unrepresentable. Validation covers field well-formedness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxPayload {
    /// Record that the post at `slug` had `content_hash`.
    NotarizePost { slug: String, content_hash: Hash },
    /// Record that the static page at `path` had `content_hash`.
    NotarizePage { path: String, content_hash: Hash },
}

impl TxPayload {
    pub fn kind(&self) -> TxKind {
        match self {
            TxPayload::NotarizePost { .. } => TxKind::NotarizePost,
            TxPayload::NotarizePage { .. } => TxKind::NotarizePage,
        }
    }

    pub fn content_hash(&self) -> Hash {
        match self {
            TxPayload::NotarizePost { content_hash, .. } => *content_hash,
            TxPayload::NotarizePage { content_hash, .. } => *content_hash,
        }
    }

    /// Check the payload fields are well-formed.
    ///
    /// Slugs are the URL slugs of published posts: lowercase alphanumerics
    /// and hyphens. Page paths are absolute. A zero content hash is always
    /// a caller bug.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            TxPayload::NotarizePost { slug, content_hash } => {
                if slug.is_empty() {
                    return Err(ValidationError::EmptySlug);
                }
                if !slug
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                {
                    return Err(ValidationError::InvalidSlug(slug.clone()));
                }
                if *content_hash == Hash::ZERO {
                    return Err(ValidationError::ZeroContentHash);
                }
                Ok(())
            }
            TxPayload::NotarizePage { path, content_hash } => {
                if !path.starts_with('/') {
                    return Err(ValidationError::InvalidPath(path.clone()));
                }
                if *content_hash == Hash::ZERO {
                    return Err(ValidationError::ZeroContentHash);
                }
                Ok(())
            }
        }
    }
}

/// An admitted notarization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique id, assigned at admission.
    pub id: TxId,
    /// Kind-specific data.
    pub payload: TxPayload,
    /// Unix timestamp in milliseconds at admission.
    pub submitted_at: u64,
}

impl Transaction {
    /// Create a transaction with a fresh id and the current timestamp.
    pub fn new(payload: TxPayload) -> Self {
        Self {
            id: TxId::random(),
            payload,
            submitted_at: now_millis(),
        }
    }

    /// Create a transaction with an explicit id (reload, tests).
    pub fn with_id(id: TxId, payload: TxPayload) -> Self {
        Self {
            id,
            payload,
            submitted_at: now_millis(),
        }
    }

    pub fn kind(&self) -> TxKind {
        self.payload.kind()
    }
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64
}
