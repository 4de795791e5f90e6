//! Content-notarization ledger engine.
//!
//! A single-proposer, hash-chained, append-only log for timestamping
//! published content. The pieces, leaves first:
//! - **Mempool**: bounded FIFO pool of admitted, uncommitted transactions
//! - **Chain**: append-only sequence of signed blocks with full re-verification
//! - **BlockAssembler**: drains a batch, seals a block, appends it
//! - **Ledger**: the facade collaborators call
//!
//! # Example
//!
//! ```rust,no_run
//! use notara_ledger::{Ledger, LedgerConfig, MineOutcome};
//! use notara_core::{hash, TxPayload};
//!
//! let ledger = Ledger::new(LedgerConfig::default()).unwrap();
//!
//! ledger.submit(TxPayload::NotarizePost {
//!     slug: "hello-world".into(),
//!     content_hash: hash(b"post body"),
//! }).unwrap();
//!
//! match ledger.mine().unwrap() {
//!     MineOutcome::Sealed(block) => println!("sealed block {}", block.height),
//!     MineOutcome::Idle => println!("nothing to commit"),
//! }
//! assert!(ledger.verify().is_ok());
//! ```

pub mod assembler;
pub mod chain;
pub mod ledger;
pub mod mempool;

// Re-export commonly used types
pub use assembler::{BlockAssembler, MineOutcome};
pub use chain::{Chain, ChainError, ChainViolation};
pub use ledger::{Ledger, LedgerConfig, LedgerError};
pub use mempool::{Mempool, MempoolError};
