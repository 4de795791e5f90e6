//! Block assembly: drain a batch, seal it, append it.

use crate::chain::{Chain, ChainError};
use crate::mempool::Mempool;
use notara_core::{Block, Hash, KeyError, KeyManager, Transaction};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Default batch bound: at most this many transactions per block.
pub const DEFAULT_BATCH: usize = 5;

/// Errors that can occur while mining a block.
///
/// Either way the drained batch has already been requeued at the front of
/// the mempool; `Rejected` is retryable once the tip stabilizes.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("block signing failed: {0}")]
    Signing(#[from] KeyError),

    #[error("chain rejected block, batch requeued: {0}")]
    Rejected(#[from] ChainError),
}

/// The result of a mining attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    /// A block was sealed and appended.
    Sealed(Block),
    /// The mempool held nothing to commit; no chain mutation happened.
    Idle,
}

impl MineOutcome {
    pub fn block(&self) -> Option<&Block> {
        match self {
            MineOutcome::Sealed(block) => Some(block),
            MineOutcome::Idle => None,
        }
    }
}

/// Drains bounded batches from the mempool into signed blocks.
///
/// Holds shared handles to the mempool, the chain, and the proposer's key
/// manager; there is no ambient key state. A seal lock serializes mining
/// attempts so the tip read and the append always pair up.
pub struct BlockAssembler {
    mempool: Arc<Mempool>,
    chain: Arc<Chain>,
    keys: Arc<KeyManager>,
    batch: usize,
    seal_lock: Mutex<()>,
}

impl BlockAssembler {
    pub fn new(mempool: Arc<Mempool>, chain: Arc<Chain>, keys: Arc<KeyManager>) -> Self {
        Self::with_batch(mempool, chain, keys, DEFAULT_BATCH)
    }

    /// Create an assembler with an explicit batch bound. Bound 0 is clamped
    /// to 1: a miner that can commit nothing is a misconfiguration.
    pub fn with_batch(
        mempool: Arc<Mempool>,
        chain: Arc<Chain>,
        keys: Arc<KeyManager>,
        batch: usize,
    ) -> Self {
        Self {
            mempool,
            chain,
            keys,
            batch: batch.max(1),
            seal_lock: Mutex::new(()),
        }
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Drain up to the batch bound and commit the result as one block.
    ///
    /// An empty drain is [`MineOutcome::Idle`]: mining never produces empty
    /// blocks and never touches the chain in that case. Drain and append
    /// are one logical transaction; if sealing or appending fails, the
    /// drained batch is requeued at the front of the mempool so nothing is
    /// lost and relative order is preserved. The one exception is a
    /// transaction whose id the chain already holds: requeueing it would
    /// poison every later batch, so it is dropped instead.
    pub fn mine(&self) -> Result<MineOutcome, AssembleError> {
        let _seal = self.seal_lock.lock().expect("seal lock poisoned");

        let drained = self.mempool.drain(self.batch);
        if drained.is_empty() {
            tracing::debug!("mine requested with empty mempool, nothing to do");
            return Ok(MineOutcome::Idle);
        }

        match self.seal_and_append(&drained) {
            Ok(block) => {
                // The ids are in the chain's committed index now; release
                // the in-flight guard.
                self.mempool.mark_committed(&drained);
                tracing::info!(
                    height = block.height,
                    block_hash = %block.block_hash,
                    tx_count = block.tx_count(),
                    "sealed block"
                );
                Ok(MineOutcome::Sealed(block))
            }
            Err(err) => {
                // Requeueing a transaction the chain already holds would
                // wedge every batch behind it, so already-committed ids
                // are dropped and only the rest rolls back.
                let (dupes, pending): (Vec<_>, Vec<_>) = drained
                    .into_iter()
                    .partition(|tx| self.chain.contains_tx(&tx.id));
                if !dupes.is_empty() {
                    tracing::warn!(
                        count = dupes.len(),
                        "dropping already-committed transactions from failed batch"
                    );
                    self.mempool.mark_committed(&dupes);
                }
                tracing::warn!(error = %err, count = pending.len(), "mining failed, requeueing batch");
                self.mempool.requeue_front(pending);
                Err(err)
            }
        }
    }

    fn seal_and_append(&self, drained: &[Transaction]) -> Result<Block, AssembleError> {
        let (height, prev_hash) = match self.chain.tip_info() {
            Some((tip_height, tip_hash)) => (tip_height + 1, tip_hash),
            None => (0, Hash::ZERO),
        };

        let block = Block::seal(height, prev_hash, drained.to_vec(), &self.keys)?;
        let proposer = self.keys.public_key()?;
        self.chain.append(&block, &proposer)?;
        Ok(block)
    }
}
