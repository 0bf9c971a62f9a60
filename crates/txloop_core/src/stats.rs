//! Transaction and loop statistics.
//!
//! All counters are atomic and can be read while transactions are in
//! progress. Values only ever increase.
//!
//! # Usage
//!
//! ```rust
//! use txloop_core::TransactionManager;
//!
//! let manager = TransactionManager::new();
//! let mut txn = manager.begin();
//! manager.commit(&mut txn).unwrap();
//!
//! let stats = manager.stats().snapshot();
//! assert_eq!(stats.started, 1);
//! assert_eq!(stats.committed, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a [`TransactionManager`](crate::TransactionManager).
#[derive(Debug, Default)]
pub struct TransactionStats {
    started: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
}

impl TransactionStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> TransactionStatsSnapshot {
        TransactionStatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransactionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStatsSnapshot {
    /// Transactions begun.
    pub started: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions aborted, including failed commits.
    pub aborted: u64,
}

/// Counters kept by a [`TransactionLoop`](crate::TransactionLoop).
#[derive(Debug, Default)]
pub struct LoopStats {
    invocations: AtomicU64,
    attempts: AtomicU64,
    commits: AtomicU64,
    retries: AtomicU64,
    clean_aborts: AtomicU64,
    vetoed_aborts: AtomicU64,
    failures: AtomicU64,
    slow_commits: AtomicU64,
}

impl LoopStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_clean_abort(&self) {
        self.clean_aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_vetoed_abort(&self) {
        self.vetoed_aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_slow_commit(&self) {
        self.slow_commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> LoopStatsSnapshot {
        LoopStatsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            clean_aborts: self.clean_aborts.load(Ordering::Relaxed),
            vetoed_aborts: self.vetoed_aborts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            slow_commits: self.slow_commits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LoopStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStatsSnapshot {
    /// Calls to `TransactionLoop::run`.
    pub invocations: u64,
    /// Attempts across all invocations.
    pub attempts: u64,
    /// Successful commits.
    pub commits: u64,
    /// Attempts that were followed by another attempt.
    pub retries: u64,
    /// Aborts because the work was side-effect free.
    pub clean_aborts: u64,
    /// Aborts because the transaction was doomed or vetoed.
    pub vetoed_aborts: u64,
    /// Invocations that ended with an error.
    pub failures: u64,
    /// Commits slower than the configured threshold.
    pub slow_commits: u64,
}
