//! The ledger facade: what UI and admin collaborators call.

use crate::assembler::{AssembleError, BlockAssembler, MineOutcome, DEFAULT_BATCH};
use crate::chain::{Chain, ChainViolation};
use crate::mempool::{Mempool, MempoolError, DEFAULT_CAPACITY};
use notara_core::{Block, KeyError, KeyManager, PublicKey, Transaction, TxId, TxPayload};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the facade.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Mempool(#[from] MempoolError),

    #[error(transparent)]
    Mine(#[from] AssembleError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("transaction {0} is already committed")]
    AlreadyCommitted(TxId),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Ledger sizing knobs.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Mempool capacity; oldest entries are evicted beyond this.
    pub capacity: usize,
    /// Maximum transactions per block.
    pub batch: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            batch: DEFAULT_BATCH,
        }
    }
}

/// The content-notarization ledger engine.
///
/// Owns the proposer key manager, the mempool, the chain, and the block
/// assembler. Safe to share behind an `Arc` and call from multiple threads;
/// the components serialize their own critical sections.
pub struct Ledger {
    keys: Arc<KeyManager>,
    mempool: Arc<Mempool>,
    chain: Arc<Chain>,
    assembler: BlockAssembler,
}

impl Ledger {
    /// Create a ledger with a freshly generated proposer key.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        let keys = Arc::new(KeyManager::generated()?);
        Ok(Self::with_keys(config, keys))
    }

    /// Create a ledger around an existing key manager.
    pub fn with_keys(config: LedgerConfig, keys: Arc<KeyManager>) -> Self {
        let mempool = Arc::new(Mempool::with_capacity(config.capacity));
        let chain = Arc::new(Chain::new());
        let assembler = BlockAssembler::with_batch(
            Arc::clone(&mempool),
            Arc::clone(&chain),
            Arc::clone(&keys),
            config.batch,
        );
        Self {
            keys,
            mempool,
            chain,
            assembler,
        }
    }

    /// Validate and admit a notarization request; returns the assigned id.
    pub fn submit(&self, payload: TxPayload) -> Result<TxId> {
        let tx = Transaction::new(payload);
        self.submit_transaction(tx)
    }

    /// Admit a transaction that already carries an id (resubmission paths).
    ///
    /// An id is unique across the mempool and every committed block, so a
    /// committed id is rejected outright. The committed lookup runs under
    /// the mempool lock, so a concurrent mine cannot commit the id between
    /// the check and the insertion.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<TxId> {
        if self.chain.contains_tx(&tx.id) {
            return Err(LedgerError::AlreadyCommitted(tx.id));
        }
        let id = tx.id;
        let kind = tx.kind();
        let position = self
            .mempool
            .admit_where(tx, |id| self.chain.contains_tx(id))?;
        tracing::info!(id = %id, %kind, position, "transaction admitted");
        Ok(id)
    }

    /// Pending transactions in admission order (read-only).
    pub fn mempool_snapshot(&self) -> Vec<Transaction> {
        self.mempool.snapshot()
    }

    /// Number of pending transactions.
    pub fn pending(&self) -> usize {
        self.mempool.size()
    }

    /// Drain a batch into a new signed block, if there is anything to drain.
    pub fn mine(&self) -> Result<MineOutcome> {
        Ok(self.assembler.mine()?)
    }

    /// All committed blocks in order (read-only).
    pub fn chain_snapshot(&self) -> Vec<Block> {
        self.chain.snapshot()
    }

    /// Current chain height, or `None` before the first block.
    pub fn height(&self) -> Option<u64> {
        self.chain.tip_info().map(|(h, _)| h)
    }

    /// Re-verify the full chain against the current proposer key.
    pub fn verify(&self) -> Result<std::result::Result<u64, ChainViolation>> {
        let proposer = self.keys.public_key()?;
        let result = self.chain.verify(&proposer);
        if let Err(violation) = &result {
            tracing::error!(height = violation.height, reason = %violation.reason,
                "chain integrity violation");
        }
        Ok(result)
    }

    /// The proposer's public verification key.
    pub fn proposer_public_key(&self) -> Result<PublicKey> {
        Ok(self.keys.public_key()?)
    }
}
