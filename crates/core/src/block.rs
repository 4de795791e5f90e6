//! Signed, hash-linked blocks.

use crate::hash::{hash_value, Hash};
use crate::keys::{KeyError, KeyManager, PublicKey, Signature};
use crate::transaction::{now_millis, Transaction, TxId};
use serde::{Deserialize, Serialize};

/// The fields covered by the block hash, in hashing order.
///
/// Borrowed so sealing and re-verification hash exactly the same bytes: a
/// `&[Transaction]` and a `Vec<Transaction>` bincode-encode identically.
#[derive(Serialize)]
struct HashedFields<'a> {
    height: u64,
    prev_hash: &'a Hash,
    timestamp: u64,
    transactions: &'a [Transaction],
}

/// An immutable batch of committed transactions.
///
/// `block_hash` is a pure function of the other non-signature fields;
/// `signature` is the proposer's Ed25519 signature over `block_hash`.
/// Height 0 links to [`Hash::ZERO`], the genesis sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// 0-based height, strictly increasing by 1.
    pub height: u64,
    /// Hash of the block at `height - 1`, or the genesis sentinel.
    pub prev_hash: Hash,
    /// Unix timestamp in milliseconds at sealing.
    pub timestamp: u64,
    /// Committed transactions, in admission order. Never empty.
    pub transactions: Vec<Transaction>,
    /// Blake3 over `(height, prev_hash, timestamp, transactions)`.
    pub block_hash: Hash,
    /// Proposer signature over `block_hash`.
    pub signature: Signature,
}

impl Block {
    /// Build, hash, and sign a block in one step.
    ///
    /// There is no unsigned intermediate state: a `Block` that exists is a
    /// sealed block, valid or tampered.
    pub fn seal(
        height: u64,
        prev_hash: Hash,
        transactions: Vec<Transaction>,
        keys: &KeyManager,
    ) -> Result<Self, KeyError> {
        Self::seal_at(height, prev_hash, transactions, now_millis(), keys)
    }

    /// Like [`Block::seal`] with an explicit timestamp.
    pub fn seal_at(
        height: u64,
        prev_hash: Hash,
        transactions: Vec<Transaction>,
        timestamp: u64,
        keys: &KeyManager,
    ) -> Result<Self, KeyError> {
        let block_hash = hash_value(&HashedFields {
            height,
            prev_hash: &prev_hash,
            timestamp,
            transactions: &transactions,
        });
        let signature = keys.sign(block_hash.as_bytes())?;
        Ok(Self {
            height,
            prev_hash,
            timestamp,
            transactions,
            block_hash,
            signature,
        })
    }

    /// Recompute the hash from the block's current fields.
    ///
    /// For an untampered block this always equals `block_hash`.
    pub fn compute_hash(&self) -> Hash {
        hash_value(&HashedFields {
            height: self.height,
            prev_hash: &self.prev_hash,
            timestamp: self.timestamp,
            transactions: &self.transactions,
        })
    }

    /// Check the stored hash against a recomputation.
    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.block_hash
    }

    /// Check the signature over the stored hash against `public_key`.
    pub fn verify_signature(&self, public_key: &PublicKey) -> bool {
        public_key
            .verify(self.block_hash.as_bytes(), &self.signature)
            .is_ok()
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.prev_hash == Hash::ZERO
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn contains_tx(&self, id: &TxId) -> bool {
        self.transactions.iter().any(|tx| &tx.id == id)
    }
}
