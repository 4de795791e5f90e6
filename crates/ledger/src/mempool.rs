//! Bounded FIFO pool of admitted, not-yet-committed transactions.

use notara_core::{Transaction, TxId, ValidationError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur during mempool admission.
#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("invalid transaction: {0}")]
    Validation(#[from] ValidationError),

    #[error("duplicate transaction id {0}")]
    Duplicate(TxId),
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Default capacity, matching a low-volume notarization workload.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Default)]
struct Inner {
    /// Transactions indexed by id.
    entries: HashMap<TxId, Transaction>,
    /// Admission order, oldest first.
    order: VecDeque<TxId>,
    /// Ids drained but not yet committed or requeued. While a batch is in
    /// flight its ids live in neither the pool nor the chain; this set
    /// keeps them unadmittable for the duration.
    in_flight: HashSet<TxId>,
}

/// Transaction mempool.
///
/// All mutation happens under one internal lock, so `admit`, `drain`, and
/// `requeue_front` are mutually exclusive: a transaction is never seen by
/// two drains, and never drained after an eviction. Drained entries stay
/// guarded as in-flight until the batch is either requeued or marked
/// committed, so an id is unique across the pool, in-flight batches, and
/// (through the caller's predicate) the committed chain.
pub struct Mempool {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a mempool bounded to `capacity` entries. Capacity 0 is
    /// clamped to 1: a pool that can hold nothing cannot admit.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Validate and admit a transaction, returning its queue position.
    ///
    /// At capacity, the oldest pending entry is evicted first; admission
    /// itself never fails for fullness. Eviction is silent bookkeeping,
    /// logged but reported to nobody.
    pub fn admit(&self, tx: Transaction) -> Result<usize> {
        self.admit_where(tx, |_| false)
    }

    /// Like [`Mempool::admit`], with an extra duplicate predicate checked
    /// under the pool lock.
    ///
    /// `committed` is consulted in the same critical section as the pool
    /// and in-flight checks, so an id cannot slip in between a committed
    /// lookup and the insertion: at every instant a drained id is either
    /// in flight here or visible through the predicate.
    pub fn admit_where<F>(&self, tx: Transaction, committed: F) -> Result<usize>
    where
        F: Fn(&TxId) -> bool,
    {
        tx.payload.validate()?;

        let mut inner = self.inner.lock().expect("mempool lock poisoned");
        if inner.entries.contains_key(&tx.id)
            || inner.in_flight.contains(&tx.id)
            || committed(&tx.id)
        {
            return Err(MempoolError::Duplicate(tx.id));
        }

        if inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                tracing::debug!(evicted = %oldest, "mempool at capacity, evicting oldest entry");
            }
        }

        let id = tx.id;
        inner.order.push_back(id);
        inner.entries.insert(id, tx);
        Ok(inner.order.len() - 1)
    }

    /// Atomically remove and return up to `max` transactions, oldest first.
    ///
    /// Returns fewer than `max` (possibly none) when the pool holds fewer.
    /// The drained ids are marked in flight and stay unadmittable until
    /// the batch is passed back to [`Mempool::requeue_front`] or
    /// [`Mempool::mark_committed`].
    pub fn drain(&self, max: usize) -> Vec<Transaction> {
        let mut inner = self.inner.lock().expect("mempool lock poisoned");
        let count = max.min(inner.order.len());
        let mut drained = Vec::with_capacity(count);
        for _ in 0..count {
            let id = inner.order.pop_front().expect("order tracks entries");
            let tx = inner.entries.remove(&id).expect("order tracks entries");
            inner.in_flight.insert(id);
            drained.push(tx);
        }
        drained
    }

    /// Reinsert previously drained transactions at the head of the queue,
    /// preserving their relative order.
    ///
    /// This is the compensating half of a failed drain-and-commit: the
    /// batch goes back in front of anything admitted in the meantime, and
    /// its ids stop being in flight.
    pub fn requeue_front(&self, txs: Vec<Transaction>) {
        let mut inner = self.inner.lock().expect("mempool lock poisoned");
        for tx in txs.into_iter().rev() {
            inner.in_flight.remove(&tx.id);
            inner.order.push_front(tx.id);
            inner.entries.insert(tx.id, tx);
        }
    }

    /// Release the in-flight guard for transactions that made it into a
    /// committed block (or were dropped as already committed).
    ///
    /// Call only after the ids are visible to the `committed` predicate
    /// handed to [`Mempool::admit_where`], otherwise the uniqueness window
    /// reopens.
    pub fn mark_committed(&self, txs: &[Transaction]) {
        let mut inner = self.inner.lock().expect("mempool lock poisoned");
        for tx in txs {
            inner.in_flight.remove(&tx.id);
        }
    }

    /// Current number of pending transactions. Advisory: may be stale the
    /// moment it returns under concurrent callers.
    pub fn size(&self) -> usize {
        self.inner.lock().expect("mempool lock poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.inner
            .lock()
            .expect("mempool lock poisoned")
            .entries
            .contains_key(id)
    }

    /// Clone out the pending transactions in admission order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        let inner = self.inner.lock().expect("mempool lock poisoned");
        inner
            .order
            .iter()
            .map(|id| inner.entries[id].clone())
            .collect()
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notara_core::{hash, TxPayload};

    fn tx(slug: &str) -> Transaction {
        Transaction::new(TxPayload::NotarizePost {
            slug: slug.into(),
            content_hash: hash(slug.as_bytes()),
        })
    }

    #[test]
    fn test_admit_and_snapshot() {
        let pool = Mempool::new();
        let t1 = tx("hello-world");
        let t2 = tx("cloud-run-next");

        assert_eq!(pool.admit(t1.clone()).unwrap(), 0);
        assert_eq!(pool.admit(t2.clone()).unwrap(), 1);
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.snapshot(), vec![t1, t2]);
    }

    #[test]
    fn test_invalid_payload_rejected() {
        let pool = Mempool::new();
        let bad = Transaction::new(TxPayload::NotarizePost {
            slug: String::new(),
            content_hash: hash(b"x"),
        });
        assert!(matches!(
            pool.admit(bad),
            Err(MempoolError::Validation(ValidationError::EmptySlug))
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let pool = Mempool::new();
        let t = tx("hello-world");
        pool.admit(t.clone()).unwrap();
        assert!(matches!(pool.admit(t), Err(MempoolError::Duplicate(_))));
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn test_drain_fifo_order() {
        let pool = Mempool::new();
        let txs: Vec<_> = (0..4).map(|i| tx(&format!("post-{i}"))).collect();
        for t in &txs {
            pool.admit(t.clone()).unwrap();
        }

        let drained = pool.drain(2);
        assert_eq!(drained, txs[..2].to_vec());
        assert_eq!(pool.snapshot(), txs[2..].to_vec());
    }

    #[test]
    fn test_drain_more_than_available() {
        let pool = Mempool::new();
        pool.admit(tx("only-one")).unwrap();

        assert_eq!(pool.drain(10).len(), 1);
        assert!(pool.drain(10).is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let pool = Mempool::with_capacity(2);
        let t1 = tx("first");
        let t2 = tx("second");
        let t3 = tx("third");

        pool.admit(t1.clone()).unwrap();
        pool.admit(t2.clone()).unwrap();
        // t1 is silently evicted, admission still succeeds.
        pool.admit(t3.clone()).unwrap();

        assert_eq!(pool.size(), 2);
        assert!(!pool.contains(&t1.id));
        assert_eq!(pool.drain(10), vec![t2, t3]);
    }

    #[test]
    fn test_evicted_id_can_be_readmitted() {
        let pool = Mempool::with_capacity(1);
        let t1 = tx("first");
        pool.admit(t1.clone()).unwrap();
        pool.admit(tx("second")).unwrap();

        // Eviction removed t1 entirely, so its id is free again.
        assert_eq!(pool.admit(t1).unwrap(), 1);
    }

    #[test]
    fn test_in_flight_ids_cannot_be_readmitted() {
        let pool = Mempool::new();
        let t = tx("hello-world");
        pool.admit(t.clone()).unwrap();

        let drained = pool.drain(1);
        assert!(pool.is_empty());

        // Drained but uncommitted: the id is still taken.
        let echo = Transaction::with_id(t.id, t.payload.clone());
        assert!(matches!(
            pool.admit(echo.clone()),
            Err(MempoolError::Duplicate(id)) if id == t.id
        ));

        // After a rollback it is pending again, so still a duplicate.
        pool.requeue_front(drained);
        assert!(matches!(
            pool.admit(echo),
            Err(MempoolError::Duplicate(_))
        ));
    }

    #[test]
    fn test_admit_where_checks_committed_ids_under_the_lock() {
        let pool = Mempool::new();
        let t = tx("hello-world");
        pool.admit(t.clone()).unwrap();

        let drained = pool.drain(1);
        // The batch lands in a block: the id moves from in-flight to the
        // caller's committed set before the guard is released.
        let committed: std::collections::HashSet<TxId> =
            drained.iter().map(|tx| tx.id).collect();
        pool.mark_committed(&drained);

        let echo = Transaction::with_id(t.id, t.payload.clone());
        assert!(matches!(
            pool.admit_where(echo, |id| committed.contains(id)),
            Err(MempoolError::Duplicate(id)) if id == t.id
        ));

        // A fresh id passes the same predicate.
        assert_eq!(
            pool.admit_where(tx("cloud-run-next"), |id| committed.contains(id))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_requeue_front_preserves_order() {
        let pool = Mempool::new();
        let txs: Vec<_> = (0..3).map(|i| tx(&format!("post-{i}"))).collect();
        for t in &txs {
            pool.admit(t.clone()).unwrap();
        }

        let drained = pool.drain(2);
        let late = tx("late-arrival");
        pool.admit(late.clone()).unwrap();
        pool.requeue_front(drained);

        // Rolled-back batch goes ahead of both the untouched remainder and
        // anything admitted during the failed commit.
        let expected = vec![txs[0].clone(), txs[1].clone(), txs[2].clone(), late];
        assert_eq!(pool.snapshot(), expected);
    }

    #[test]
    fn test_concurrent_drains_never_share_entries() {
        use std::sync::Arc;
        use std::thread;

        let pool = Arc::new(Mempool::new());
        for i in 0..100 {
            pool.admit(tx(&format!("post-{i}"))).unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    let batch = pool.drain(5);
                    if batch.is_empty() {
                        break;
                    }
                    seen.extend(batch.into_iter().map(|t| t.id));
                }
                seen
            }));
        }

        let mut all: Vec<TxId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort_by_key(|id| id.0);
        all.dedup();
        assert_eq!(total, 100);
        assert_eq!(all.len(), 100);
    }
}
