//! Core primitives for the notara notarization ledger.
//!
//! This crate provides the building blocks shared by the ledger engine and
//! its collaborators:
//! - Cryptographic primitives (Blake3 hashing, Ed25519 signing)
//! - The proposer key manager
//! - Notarization transactions
//! - Signed, hash-linked blocks

pub mod block;
pub mod hash;
pub mod keys;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::Block;
pub use hash::{hash, hash_value, Hash, H256};
pub use keys::{KeyError, KeyManager, PublicKey, Signature};
pub use transaction::{Transaction, TxId, TxKind, TxPayload, ValidationError};
