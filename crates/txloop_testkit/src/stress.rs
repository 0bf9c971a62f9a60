//! Stress tests for txloop.
//!
//! These runs push many transactions through the manager and the loop,
//! sequentially and from several threads, and check that queue order holds.

use crate::fixtures::{retrying_manager, TransientError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use txloop_core::{
    enqueue_transactionally, LoopConfig, MemoryQueue, Transaction, TransactionLoop,
    TransactionManager, TxnError, TxnResult,
};

/// Outcome of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Transactions that committed.
    pub committed: usize,
    /// Transactions or loop runs that returned an error.
    pub failed: usize,
    /// Queue entries or rounds found out of order.
    pub ordering_violations: usize,
    /// Wall-clock time of the run.
    pub duration: Duration,
}

impl StressTestResult {
    /// Returns true when nothing failed and order held everywhere.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.ordering_violations == 0
    }

    /// Committed transactions per second.
    #[must_use]
    pub fn commits_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.committed as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for StressTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "committed={} failed={} out_of_order={} in {:?} ({:.0} commits/s)",
            self.committed,
            self.failed,
            self.ordering_violations,
            self.duration,
            self.commits_per_second()
        )
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of transactions to run.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Items enqueued per transaction.
    pub items_per_txn: usize,
    /// First attempt of every n-th sequence fails with a retryable error; 0 disables.
    pub fail_every: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            items_per_txn: 2,
            fail_every: 0,
        }
    }
}

/// Commits `operations` transactions of `items_per_txn` puts each and
/// drains the queue after every commit, counting rounds that come out of
/// order.
pub fn stress_fifo_rounds(config: &StressConfig) -> StressTestResult {
    let tm = TransactionManager::new();
    let queue = Arc::new(MemoryQueue::new());
    let expected: Vec<usize> = (0..config.items_per_txn).collect();

    let mut committed = 0;
    let mut failed = 0;
    let mut ordering_violations = 0;
    let start = Instant::now();

    for _ in 0..config.operations {
        let mut txn = tm.begin();
        let enqueued = expected
            .iter()
            .try_for_each(|item| enqueue_transactionally(&mut txn, &queue, *item));
        if enqueued.and_then(|()| tm.commit(&mut txn)).is_err() {
            failed += 1;
            continue;
        }

        committed += 1;
        if queue.drain() != expected {
            ordering_violations += 1;
        }
    }

    StressTestResult {
        committed,
        failed,
        ordering_violations,
        duration: start.elapsed(),
    }
}

/// Runs one transaction loop from `threads` threads at once.
///
/// Each thread enqueues `(thread, sequence, item)` triples. With
/// `fail_every` set, the first attempt of every n-th sequence fails with
/// [`TransientError`] so the loop retries it. Afterwards every thread's
/// entries must appear in the order that thread committed them and no
/// aborted attempt may leave an entry behind.
pub fn stress_concurrent_loops(config: &StressConfig) -> StressTestResult {
    let manager = retrying_manager();
    let queue: Arc<MemoryQueue<(usize, usize, usize)>> = Arc::new(MemoryQueue::new());
    let failed_once = Arc::new(Mutex::new(HashSet::new()));
    let ops_per_thread = config.operations / config.threads.max(1);
    let items_per_txn = config.items_per_txn;
    let fail_every = config.fail_every;

    let q = Arc::clone(&queue);
    let seen = Arc::clone(&failed_once);
    let tx_loop = Arc::new(
        TransactionLoop::new(
            manager,
            move |txn: &mut Transaction, &(thread, seq): &(usize, usize)| -> TxnResult<()> {
                for item in 0..items_per_txn {
                    enqueue_transactionally(txn, &q, (thread, seq, item))?;
                }
                if fail_every > 0 && seq % fail_every == 0 && seen.lock().insert((thread, seq)) {
                    return Err(TxnError::application(TransientError { attempt: 0 }));
                }
                Ok(())
            },
        )
        .with_config(LoopConfig::new().retries(5))
        .with_sleeper(|_| {}),
    );

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|thread| {
            let tx_loop = Arc::clone(&tx_loop);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            thread::spawn(move || {
                for seq in 0..ops_per_thread {
                    match tx_loop.run(&(thread, seq)) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let duration = start.elapsed();
    StressTestResult {
        committed: successful.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
        ordering_violations: ordering_violations(&queue.drain(), items_per_txn),
        duration,
    }
}

/// Counts entries that break per-thread order or duplicate a committed put.
fn ordering_violations(entries: &[(usize, usize, usize)], items_per_txn: usize) -> usize {
    let mut last: HashMap<usize, (usize, usize)> = HashMap::new();
    let mut violations = 0;

    for &(thread, seq, item) in entries {
        let expected = match last.get(&thread) {
            None => (0, 0),
            Some(&(prev_seq, prev_item)) if prev_item + 1 == items_per_txn => (prev_seq + 1, 0),
            Some(&(prev_seq, prev_item)) => (prev_seq, prev_item + 1),
        };
        if (seq, item) != expected {
            violations += 1;
        }
        last.insert(thread, (seq, item));
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_fifo_rounds() {
        let config = StressConfig {
            operations: 1_000,
            items_per_txn: 3,
            ..Default::default()
        };

        let result = stress_fifo_rounds(&config);
        assert!(result.is_clean(), "{result}");
        assert_eq!(result.committed, 1_000);
    }

    #[test]
    fn test_concurrent_loops() {
        let config = StressConfig {
            operations: 400,
            threads: 4,
            items_per_txn: 2,
            fail_every: 0,
        };

        let result = stress_concurrent_loops(&config);
        assert!(result.is_clean(), "{result}");
        assert_eq!(result.committed, 400);
    }

    #[test]
    fn test_concurrent_loops_with_retries() {
        let config = StressConfig {
            operations: 400,
            threads: 4,
            items_per_txn: 2,
            fail_every: 3,
        };

        let result = stress_concurrent_loops(&config);
        assert!(result.is_clean(), "{result}");
        assert_eq!(result.committed, 400);
    }

    #[test]
    fn result_with_failures_is_not_clean() {
        let result = StressTestResult {
            committed: 3,
            failed: 1,
            ordering_violations: 0,
            duration: Duration::from_secs(1),
        };
        assert!(!result.is_clean());
        assert_eq!(result.commits_per_second(), 3.0);
        assert!(result.to_string().starts_with("committed=3 failed=1"));
    }

    #[test]
    fn detects_reordered_entries() {
        let entries = [(0, 0, 1), (0, 0, 0)];
        assert_eq!(ordering_violations(&entries, 2), 2);

        let entries = [(0, 0, 0), (1, 0, 0), (0, 0, 1), (1, 0, 1), (0, 1, 0)];
        assert_eq!(ordering_violations(&entries, 2), 0);
    }
}
