//! # txloop Core
//!
//! Transactions with deferred, ordered side effects and a retrying loop
//! around them.
//!
//! This crate provides:
//! - A transaction manager driving two-phase commit over enlisted resources
//! - Deferred actions that run only when their transaction commits
//! - Transactional puts into bounded queues, FIFO per queue
//! - A pluggable classifier deciding which failures are retryable
//! - A transaction loop that commits, aborts or retries a handler
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use txloop_core::{
//!     enqueue_transactionally, MemoryQueue, Transaction, TransactionLoop, TransactionManager,
//!     TxnResult,
//! };
//!
//! let manager = Arc::new(TransactionManager::new());
//! let queue = Arc::new(MemoryQueue::new());
//!
//! let q = Arc::clone(&queue);
//! let tx_loop = TransactionLoop::new(manager, move |txn: &mut Transaction, job: &str| -> TxnResult<()> {
//!     enqueue_transactionally(txn, &q, job.to_string())
//! });
//!
//! tx_loop.run("index page 1").unwrap();
//! assert_eq!(queue.get_nowait().as_deref(), Some("index page 1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod config;
mod error;
#[cfg(feature = "subscriber")]
pub mod logging;
mod retry;
mod runner;
mod stats;
mod transaction;
mod types;

pub use action::{
    call_at_commit, enlist, enqueue_transactionally, BoundedQueue, DeferredAction,
    DeferredActionBuilder, MemoryQueue, Target,
};
pub use config::{LoopConfig, DEFAULT_ATTEMPTS, DEFAULT_LONG_COMMIT_DURATION};
pub use error::{BoxError, TxnError, TxnResult};
pub use retry::RetryClassifier;
pub use runner::{
    CallbackHooks, DefaultHooks, LoopHooks, Sleeper, TransactionLoop, UNKNOWN_DESCRIPTION,
};
pub use stats::{LoopStats, LoopStatsSnapshot, TransactionStats, TransactionStatsSnapshot};
pub use transaction::{DataManager, Transaction, TransactionManager, TransactionState};
pub use types::{AbortReason, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
