//! Append-only chain of committed blocks.

use notara_core::{Block, Hash, PublicKey, TxId};
use std::collections::HashSet;
use std::sync::RwLock;
use thiserror::Error;

/// Errors that can occur when appending or verifying blocks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("height conflict (expected {expected}, got {got})")]
    HeightConflict { expected: u64, got: u64 },

    #[error("prev_hash does not match the chain tip")]
    PrevHashMismatch,

    #[error("stored block_hash does not match a recomputation")]
    HashMismatch,

    #[error("block signature does not verify under the proposer key")]
    SignatureInvalid,

    #[error("transaction {0} is already committed")]
    DuplicateTransaction(TxId),

    #[error("blocks must contain at least one transaction")]
    EmptyBlock,

    #[error("genesis block must link to the zero sentinel")]
    BadGenesisLink,
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// The first integrity violation found by a full chain walk.
///
/// A violation is fatal to the trust of the chain: the caller gets the exact
/// block and reason, and the chain is never silently repaired.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("chain integrity violation at block {height}: {reason}")]
pub struct ChainViolation {
    pub height: u64,
    pub reason: ChainError,
}

#[derive(Default)]
struct Inner {
    blocks: Vec<Block>,
    /// Ids of every committed transaction, for admission-time dedup.
    committed: HashSet<TxId>,
}

/// The ordered, append-only sequence of committed blocks.
///
/// Appends serialize under a write lock on the tip, so linkage is never
/// computed against a stale predecessor. Readers get clones; stored blocks
/// are immutable once appended.
pub struct Chain {
    inner: RwLock<Inner>,
}

impl Chain {
    /// An empty chain. Only a genesis block (height 0, zero-sentinel link)
    /// is accepted until the first append succeeds.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Load a chain from previously persisted blocks without validation.
    ///
    /// Intended for reload paths: call [`Chain::verify`] afterwards to
    /// detect tampering in the persisted state.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let committed = blocks
            .iter()
            .flat_map(|b| b.transactions.iter().map(|tx| tx.id))
            .collect();
        Self {
            inner: RwLock::new(Inner { blocks, committed }),
        }
    }

    /// Validate `block` against the tip and append it.
    ///
    /// Checks, in order: non-emptiness, height contiguity, `prev_hash`
    /// linkage, recomputed hash equality, signature under `proposer`, and
    /// committed-id uniqueness. All-or-nothing: on any failure the chain is
    /// untouched.
    pub fn append(&self, block: &Block, proposer: &PublicKey) -> Result<u64> {
        let mut inner = self.inner.write().expect("chain lock poisoned");

        if block.transactions.is_empty() {
            return Err(ChainError::EmptyBlock);
        }

        match inner.blocks.last() {
            None => {
                if block.height != 0 {
                    return Err(ChainError::HeightConflict {
                        expected: 0,
                        got: block.height,
                    });
                }
                if block.prev_hash != Hash::ZERO {
                    return Err(ChainError::BadGenesisLink);
                }
            }
            Some(tip) => {
                let expected = tip.height + 1;
                if block.height != expected {
                    return Err(ChainError::HeightConflict {
                        expected,
                        got: block.height,
                    });
                }
                if block.prev_hash != tip.block_hash {
                    return Err(ChainError::PrevHashMismatch);
                }
            }
        }

        if !block.verify_hash() {
            return Err(ChainError::HashMismatch);
        }
        if !block.verify_signature(proposer) {
            return Err(ChainError::SignatureInvalid);
        }
        if let Some(tx) = block.transactions.iter().find(|tx| inner.committed.contains(&tx.id)) {
            return Err(ChainError::DuplicateTransaction(tx.id));
        }

        for tx in &block.transactions {
            inner.committed.insert(tx.id);
        }
        inner.blocks.push(block.clone());
        Ok(block.height)
    }

    /// Re-walk the whole chain from genesis, re-checking every invariant.
    ///
    /// Returns the first violation found, or `Ok` with the number of blocks
    /// checked. Verification is read-only; a tampered chain is reported,
    /// never healed.
    pub fn verify(&self, proposer: &PublicKey) -> std::result::Result<u64, ChainViolation> {
        let inner = self.inner.read().expect("chain lock poisoned");
        let mut seen: HashSet<TxId> = HashSet::new();
        let mut prev: Option<&Block> = None;

        for (index, block) in inner.blocks.iter().enumerate() {
            let violation = |reason| ChainViolation {
                height: index as u64,
                reason,
            };

            if block.transactions.is_empty() {
                return Err(violation(ChainError::EmptyBlock));
            }
            let expected = prev.map(|p| p.height + 1).unwrap_or(0);
            if block.height != expected {
                return Err(violation(ChainError::HeightConflict {
                    expected,
                    got: block.height,
                }));
            }
            match prev {
                None => {
                    if block.prev_hash != Hash::ZERO {
                        return Err(violation(ChainError::BadGenesisLink));
                    }
                }
                Some(p) => {
                    if block.prev_hash != p.block_hash {
                        return Err(violation(ChainError::PrevHashMismatch));
                    }
                }
            }
            if !block.verify_hash() {
                return Err(violation(ChainError::HashMismatch));
            }
            if !block.verify_signature(proposer) {
                return Err(violation(ChainError::SignatureInvalid));
            }
            for tx in &block.transactions {
                if !seen.insert(tx.id) {
                    return Err(violation(ChainError::DuplicateTransaction(tx.id)));
                }
            }
            prev = Some(block);
        }

        Ok(inner.blocks.len() as u64)
    }

    /// Get a block by height.
    pub fn get(&self, height: u64) -> Option<Block> {
        self.inner
            .read()
            .expect("chain lock poisoned")
            .blocks
            .get(height as usize)
            .cloned()
    }

    /// The latest committed block, if any.
    pub fn tip(&self) -> Option<Block> {
        self.inner
            .read()
            .expect("chain lock poisoned")
            .blocks
            .last()
            .cloned()
    }

    /// Height and hash of the tip, without cloning the whole block.
    pub fn tip_info(&self) -> Option<(u64, Hash)> {
        self.inner
            .read()
            .expect("chain lock poisoned")
            .blocks
            .last()
            .map(|b| (b.height, b.block_hash))
    }

    /// Number of committed blocks.
    pub fn len(&self) -> u64 {
        self.inner.read().expect("chain lock poisoned").blocks.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` appears in any committed block.
    pub fn contains_tx(&self, id: &TxId) -> bool {
        self.inner
            .read()
            .expect("chain lock poisoned")
            .committed
            .contains(id)
    }

    /// Clone out all committed blocks in order.
    pub fn snapshot(&self) -> Vec<Block> {
        self.inner.read().expect("chain lock poisoned").blocks.clone()
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notara_core::{hash, KeyManager, Transaction, TxPayload};

    fn tx(slug: &str) -> Transaction {
        Transaction::new(TxPayload::NotarizePost {
            slug: slug.into(),
            content_hash: hash(slug.as_bytes()),
        })
    }

    fn genesis(keys: &KeyManager, txs: Vec<Transaction>) -> Block {
        Block::seal(0, Hash::ZERO, txs, keys).unwrap()
    }

    fn extend(chain: &Chain, keys: &KeyManager, txs: Vec<Transaction>) -> Block {
        let (height, tip_hash) = chain.tip_info().expect("chain not empty");
        let block = Block::seal(height + 1, tip_hash, txs, keys).unwrap();
        chain.append(&block, &keys.public_key().unwrap()).unwrap();
        block
    }

    #[test]
    fn test_genesis_append() {
        let keys = KeyManager::generated().unwrap();
        let chain = Chain::new();
        let block = genesis(&keys, vec![tx("hello-world")]);

        assert_eq!(chain.append(&block, &keys.public_key().unwrap()).unwrap(), 0);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.tip().unwrap(), block);
    }

    #[test]
    fn test_empty_chain_rejects_non_genesis() {
        let keys = KeyManager::generated().unwrap();
        let chain = Chain::new();
        let block = Block::seal(1, Hash::ZERO, vec![tx("a1")], &keys).unwrap();

        assert_eq!(
            chain.append(&block, &keys.public_key().unwrap()),
            Err(ChainError::HeightConflict { expected: 0, got: 1 })
        );
        assert!(chain.is_empty());
    }

    #[test]
    fn test_genesis_must_link_sentinel() {
        let keys = KeyManager::generated().unwrap();
        let chain = Chain::new();
        let block = Block::seal(0, hash(b"not-the-sentinel"), vec![tx("a1")], &keys).unwrap();

        assert_eq!(
            chain.append(&block, &keys.public_key().unwrap()),
            Err(ChainError::BadGenesisLink)
        );
    }

    #[test]
    fn test_empty_block_rejected() {
        let keys = KeyManager::generated().unwrap();
        let chain = Chain::new();
        let block = Block::seal(0, Hash::ZERO, vec![], &keys).unwrap();

        assert_eq!(
            chain.append(&block, &keys.public_key().unwrap()),
            Err(ChainError::EmptyBlock)
        );
    }

    #[test]
    fn test_stale_prev_hash_rejected() {
        let keys = KeyManager::generated().unwrap();
        let pk = keys.public_key().unwrap();
        let chain = Chain::new();
        chain.append(&genesis(&keys, vec![tx("a1")]), &pk).unwrap();
        extend(&chain, &keys, vec![tx("b2")]);

        // Built against the genesis hash instead of the current tip.
        let stale = Block::seal(2, chain.get(0).unwrap().block_hash, vec![tx("c3")], &keys).unwrap();
        assert_eq!(chain.append(&stale, &pk), Err(ChainError::PrevHashMismatch));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_tampered_block_rejected() {
        let keys = KeyManager::generated().unwrap();
        let pk = keys.public_key().unwrap();
        let chain = Chain::new();

        let mut block = genesis(&keys, vec![tx("hello-world")]);
        block.transactions[0].payload = TxPayload::NotarizePost {
            slug: "tampered".into(),
            content_hash: hash(b"tampered"),
        };
        assert_eq!(chain.append(&block, &pk), Err(ChainError::HashMismatch));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let keys = KeyManager::generated().unwrap();
        let other = KeyManager::generated().unwrap();
        let chain = Chain::new();
        let block = genesis(&other, vec![tx("a1")]);

        assert_eq!(
            chain.append(&block, &keys.public_key().unwrap()),
            Err(ChainError::SignatureInvalid)
        );
    }

    #[test]
    fn test_committed_tx_cannot_repeat() {
        let keys = KeyManager::generated().unwrap();
        let pk = keys.public_key().unwrap();
        let chain = Chain::new();

        let t = tx("hello-world");
        chain.append(&genesis(&keys, vec![t.clone()]), &pk).unwrap();

        let (height, tip_hash) = chain.tip_info().unwrap();
        let repeat = Block::seal(height + 1, tip_hash, vec![t.clone()], &keys).unwrap();
        assert_eq!(
            chain.append(&repeat, &pk),
            Err(ChainError::DuplicateTransaction(t.id))
        );
        assert!(chain.contains_tx(&t.id));
    }

    #[test]
    fn test_verify_clean_chain() {
        let keys = KeyManager::generated().unwrap();
        let pk = keys.public_key().unwrap();
        let chain = Chain::new();
        chain.append(&genesis(&keys, vec![tx("a1")]), &pk).unwrap();
        extend(&chain, &keys, vec![tx("b2"), tx("c3")]);
        extend(&chain, &keys, vec![tx("d4")]);

        assert_eq!(chain.verify(&pk), Ok(3));
    }

    #[test]
    fn test_verify_detects_tampered_payload_at_exact_height() {
        let keys = KeyManager::generated().unwrap();
        let pk = keys.public_key().unwrap();
        let chain = Chain::new();
        chain.append(&genesis(&keys, vec![tx("a1")]), &pk).unwrap();
        extend(&chain, &keys, vec![tx("b2")]);

        let mut blocks = chain.snapshot();
        blocks[1].transactions[0].payload = TxPayload::NotarizePost {
            slug: "tampered".into(),
            content_hash: hash(b"tampered"),
        };
        let reloaded = Chain::from_blocks(blocks);

        assert_eq!(
            reloaded.verify(&pk),
            Err(ChainViolation {
                height: 1,
                reason: ChainError::HashMismatch,
            })
        );
    }

    #[test]
    fn test_verify_detects_broken_link() {
        let keys = KeyManager::generated().unwrap();
        let pk = keys.public_key().unwrap();
        let chain = Chain::new();
        chain.append(&genesis(&keys, vec![tx("a1")]), &pk).unwrap();
        extend(&chain, &keys, vec![tx("b2")]);

        let mut blocks = chain.snapshot();
        blocks[1].prev_hash = hash(b"forged");
        let reloaded = Chain::from_blocks(blocks);

        let violation = reloaded.verify(&pk).unwrap_err();
        assert_eq!(violation.height, 1);
        assert_eq!(violation.reason, ChainError::PrevHashMismatch);
    }

    #[test]
    fn test_verify_detects_flipped_signature_byte() {
        let keys = KeyManager::generated().unwrap();
        let pk = keys.public_key().unwrap();
        let chain = Chain::new();
        chain.append(&genesis(&keys, vec![tx("a1")]), &pk).unwrap();

        let mut blocks = chain.snapshot();
        blocks[0].signature.0[10] ^= 0x01;
        let reloaded = Chain::from_blocks(blocks);

        assert_eq!(
            reloaded.verify(&pk),
            Err(ChainViolation {
                height: 0,
                reason: ChainError::SignatureInvalid,
            })
        );
    }

    #[test]
    fn test_verify_after_key_rotation_fails_with_new_key() {
        let keys = KeyManager::generated().unwrap();
        let old_pk = keys.public_key().unwrap();
        let chain = Chain::new();
        chain.append(&genesis(&keys, vec![tx("a1")]), &old_pk).unwrap();

        let new_pk = keys.generate().unwrap();
        assert!(chain.verify(&new_pk).is_err());
        assert!(chain.verify(&old_pk).is_ok());
    }

    #[test]
    fn test_get_and_tip_accessors() {
        let keys = KeyManager::generated().unwrap();
        let pk = keys.public_key().unwrap();
        let chain = Chain::new();

        assert!(chain.tip().is_none());
        assert!(chain.tip_info().is_none());
        assert!(chain.get(0).is_none());

        let block = genesis(&keys, vec![tx("a1")]);
        chain.append(&block, &pk).unwrap();

        assert_eq!(chain.get(0).unwrap(), block);
        assert_eq!(chain.tip_info().unwrap(), (0, block.block_hash));
        assert!(chain.get(1).is_none());
    }
}
