//! The retrying transaction loop.

use crate::config::LoopConfig;
use crate::error::{TxnError, TxnResult};
use crate::retry::RetryClassifier;
use crate::runner::hooks::{DefaultHooks, LoopHooks};
use crate::stats::LoopStats;
use crate::transaction::{Transaction, TransactionManager};
use crate::types::AbortReason;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Blocking or cooperative delay used between retries.
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Abort the transaction but hand `result` back to the caller.
struct AbortWithResult<T> {
    result: T,
    reason: AbortReason,
}

/// How a single attempt ended, when it did not commit.
enum AttemptError<T> {
    /// Deliberate abort; never escapes the loop.
    Abort(AbortWithResult<T>),
    /// Ordinary failure; may be retried.
    Failed(TxnError),
    /// Commit found the transaction already inconsistent; never retried.
    Corrupted(TxnError),
}

impl<T> From<TxnError> for AttemptError<T> {
    fn from(err: TxnError) -> Self {
        Self::Failed(err)
    }
}

/// Runs a handler inside a transaction, committing on success and retrying
/// retryable failures with a fresh transaction.
///
/// Every attempt:
/// 1. begins a transaction and notes the description on it
/// 2. calls `prep_for_retry` unless this is the final attempt
/// 3. runs the handler
/// 4. aborts and returns the result if the work is side-effect free
/// 5. aborts and returns the result if the transaction is doomed or the
///    commit is vetoed
/// 6. commits and returns the result
///
/// Any error in steps 2-6 aborts the attempt's transaction. The error is
/// retried when the [`RetryClassifier`] accepts it and attempts remain;
/// otherwise it is returned unchanged. [`TxnError::Exit`] and inconsistent
/// commit states are never retried.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use txloop_core::{LoopConfig, Transaction, TransactionLoop, TransactionManager, TxnError, TxnResult};
///
/// let calls = AtomicU32::new(0);
/// let handler = |_: &mut Transaction, _: &()| -> TxnResult<u32> {
///     match calls.fetch_add(1, Ordering::SeqCst) {
///         0 => Err(TxnError::conflict("first attempt loses")),
///         n => Ok(n),
///     }
/// };
///
/// let tx_loop = TransactionLoop::new(Arc::new(TransactionManager::new()), handler)
///     .with_config(LoopConfig::new().retries(3));
///
/// assert_eq!(tx_loop.run(&()).unwrap(), 1);
/// assert_eq!(tx_loop.stats().snapshot().retries, 1);
/// ```
pub struct TransactionLoop<H, K = DefaultHooks> {
    handler: H,
    hooks: K,
    config: LoopConfig,
    manager: Arc<TransactionManager>,
    classifier: Arc<RetryClassifier>,
    sleeper: Sleeper,
    stats: LoopStats,
}

impl<H> TransactionLoop<H, DefaultHooks> {
    /// Creates a loop with default configuration and hooks.
    ///
    /// Retry classification comes from `manager`.
    pub fn new(manager: Arc<TransactionManager>, handler: H) -> Self {
        let classifier = Arc::clone(manager.classifier());
        Self {
            handler,
            hooks: DefaultHooks,
            config: LoopConfig::default(),
            manager,
            classifier,
            sleeper: Arc::new(std::thread::sleep),
            stats: LoopStats::new(),
        }
    }
}

impl<H, K> TransactionLoop<H, K> {
    /// Replaces the hooks.
    pub fn with_hooks<K2>(self, hooks: K2) -> TransactionLoop<H, K2> {
        TransactionLoop {
            handler: self.handler,
            hooks,
            config: self.config,
            manager: self.manager,
            classifier: self.classifier,
            sleeper: self.sleeper,
            stats: self.stats,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the manager's retry classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<RetryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replaces the primitive used to wait between retries.
    #[must_use]
    pub fn with_sleeper<F>(mut self, sleeper: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Returns the hooks.
    #[must_use]
    pub fn hooks(&self) -> &K {
        &self.hooks
    }

    /// Returns the transaction manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Returns lifetime counters.
    #[must_use]
    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Invokes the handler once within `txn`.
    pub fn run_handler<A, T>(&self, txn: &mut Transaction, args: &A) -> TxnResult<T>
    where
        A: ?Sized,
        H: Fn(&mut Transaction, &A) -> TxnResult<T>,
    {
        (self.handler)(txn, args)
    }

    /// Runs the handler until it commits, aborts with a result, or fails.
    pub fn run<A, T>(&self, args: &A) -> TxnResult<T>
    where
        A: ?Sized,
        H: Fn(&mut Transaction, &A) -> TxnResult<T>,
        K: LoopHooks<A, T>,
    {
        self.stats.record_invocation();
        let attempts = self.config.attempts();
        let description = self.hooks.describe_transaction(args);
        let mut remaining = attempts;

        loop {
            remaining -= 1;
            let attempt = attempts - remaining;
            self.stats.record_attempt();

            let mut txn = self.manager.begin();
            txn.note(&description);

            let err = match self.attempt(&mut txn, remaining, args) {
                Ok(result) => return Ok(result),
                Err(AttemptError::Abort(abort)) => {
                    self.abort_with_result(&mut txn, abort.reason);
                    return Ok(abort.result);
                }
                Err(AttemptError::Corrupted(err)) => {
                    error!(
                        txid = %txn.id(),
                        attempt,
                        error = %err,
                        description = %description,
                        "commit found the transaction in an inconsistent state"
                    );
                    self.abort_quietly(&mut txn);
                    self.stats.record_failure();
                    return Err(err);
                }
                Err(AttemptError::Failed(err)) => err,
            };

            if err.is_exit() {
                info!(txid = %txn.id(), attempt, "exit requested; abandoning transaction");
                self.abort_quietly(&mut txn);
                self.stats.record_failure();
                return Err(err);
            }

            self.abort_quietly(&mut txn);

            if remaining > 0 && self.classifier.is_retryable(&err) {
                info!(
                    txid = %txn.id(),
                    attempt,
                    remaining,
                    error = %err,
                    "retrying transaction"
                );
                self.stats.record_retry();
                if let Some(delay) = self.config.sleep {
                    (self.sleeper)(delay);
                }
                continue;
            }

            debug!(
                txid = %txn.id(),
                attempt,
                remaining,
                error = %err,
                "transaction failed"
            );
            self.stats.record_failure();
            return Err(err);
        }
    }

    fn attempt<A, T>(
        &self,
        txn: &mut Transaction,
        remaining: u32,
        args: &A,
    ) -> Result<T, AttemptError<T>>
    where
        A: ?Sized,
        H: Fn(&mut Transaction, &A) -> TxnResult<T>,
        K: LoopHooks<A, T>,
    {
        if remaining > 0 {
            if let ControlFlow::Break(result) = self.hooks.prep_for_retry(remaining, txn, args)? {
                return Err(AttemptError::Abort(AbortWithResult {
                    result,
                    reason: AbortReason::PreparationRequested,
                }));
            }
        }

        let result = self.run_handler(txn, args)?;

        if self.hooks.should_abort_due_to_no_side_effects(&self.config, args) {
            return Err(AttemptError::Abort(AbortWithResult {
                result,
                reason: AbortReason::SideEffectFree,
            }));
        }

        if txn.is_doomed() || self.hooks.should_veto_commit(&result, args) {
            return Err(AttemptError::Abort(AbortWithResult {
                result,
                reason: AbortReason::DoomedOrVetoed,
            }));
        }

        self.commit(txn)?;
        Ok(result)
    }

    fn commit<T>(&self, txn: &mut Transaction) -> Result<(), AttemptError<T>> {
        let started = Instant::now();
        let outcome = self.manager.commit(txn);
        let elapsed = started.elapsed();

        if elapsed > self.config.long_commit_duration {
            self.stats.record_slow_commit();
            warn!(
                txid = %txn.id(),
                elapsed_ms = elapsed.as_millis() as u64,
                description = %txn.description(),
                "slow commit"
            );
        }

        match outcome {
            Ok(()) => {
                self.stats.record_commit();
                Ok(())
            }
            Err(err) if err.is_inconsistent_state() => Err(AttemptError::Corrupted(err)),
            Err(err) => Err(AttemptError::Failed(err)),
        }
    }

    fn abort_with_result(&self, txn: &mut Transaction, reason: AbortReason) {
        match reason {
            AbortReason::SideEffectFree => self.stats.record_clean_abort(),
            AbortReason::DoomedOrVetoed | AbortReason::PreparationRequested => {
                self.stats.record_vetoed_abort()
            }
        }
        debug!(txid = %txn.id(), reason = %reason, "aborting and returning result");
        self.abort_quietly(txn);
    }

    /// Aborts `txn` if it is still active. Failures are logged, never raised,
    /// so they cannot mask the error being handled.
    fn abort_quietly(&self, txn: &mut Transaction) {
        if !txn.is_active() {
            return;
        }
        if let Err(err) = self.manager.abort(txn) {
            warn!(txid = %txn.id(), error = %err, "failed to abort transaction");
        }
    }
}

impl<H, K: fmt::Debug> fmt::Debug for TransactionLoop<H, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionLoop")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{enqueue_transactionally, MemoryQueue};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager() -> Arc<TransactionManager> {
        Arc::new(TransactionManager::new())
    }

    #[test]
    fn commits_and_returns_result() {
        let tm = manager();
        let tx_loop = TransactionLoop::new(Arc::clone(&tm), |_: &mut Transaction, x: &u32| {
            Ok(x * 2)
        });

        assert_eq!(tx_loop.run(&21).unwrap(), 42);
        assert_eq!(tm.stats().snapshot().committed, 1);
        assert_eq!(tx_loop.stats().snapshot().commits, 1);
    }

    #[test]
    fn description_is_noted_on_transaction() {
        struct Describe;
        impl LoopHooks<str, String> for Describe {
            fn describe_transaction(&self, args: &str) -> String {
                format!("job {args}")
            }
        }

        let tx_loop = TransactionLoop::new(manager(), |txn: &mut Transaction, _: &str| {
            Ok(txn.description().to_string())
        })
        .with_hooks(Describe);

        assert_eq!(tx_loop.run("7").unwrap(), "job 7");
    }

    #[test]
    fn default_description_is_unknown() {
        let tx_loop = TransactionLoop::new(manager(), |txn: &mut Transaction, _: &()| {
            Ok(txn.description().to_string())
        });
        assert_eq!(tx_loop.run(&()).unwrap(), "Unknown");
    }

    #[test]
    fn doomed_transaction_returns_result_without_commit() {
        let tm = manager();
        let queue = Arc::new(MemoryQueue::new());
        let q = Arc::clone(&queue);
        let tx_loop = TransactionLoop::new(Arc::clone(&tm), move |txn: &mut Transaction, _: &()| -> TxnResult<&'static str> {
            enqueue_transactionally(txn, &q, 1)?;
            txn.doom();
            Ok("doomed")
        });

        assert_eq!(tx_loop.run(&()).unwrap(), "doomed");
        assert!(queue.is_empty());
        assert_eq!(tm.stats().snapshot().committed, 0);
        assert_eq!(tx_loop.stats().snapshot().vetoed_aborts, 1);
    }

    #[test]
    fn prep_for_retry_skipped_on_final_attempt() {
        struct CountPrep(AtomicU32);
        impl LoopHooks<(), ()> for CountPrep {
            fn prep_for_retry(
                &self,
                _remaining: u32,
                _txn: &mut Transaction,
                _args: &(),
            ) -> TxnResult<ControlFlow<()>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(ControlFlow::Continue(()))
            }
        }

        let tx_loop = TransactionLoop::new(manager(), |_: &mut Transaction, _: &()| {
            Err::<(), _>(TxnError::conflict("always"))
        })
        .with_config(LoopConfig::new().retries(2))
        .with_hooks(CountPrep(AtomicU32::new(0)));

        assert!(tx_loop.run(&()).is_err());
        assert_eq!(tx_loop.hooks().0.load(Ordering::SeqCst), 2);
        assert_eq!(tx_loop.stats().snapshot().attempts, 3);
    }

    #[test]
    fn prep_for_retry_can_abort_with_result() {
        struct Stop;
        impl LoopHooks<(), u8> for Stop {
            fn prep_for_retry(
                &self,
                _remaining: u32,
                _txn: &mut Transaction,
                _args: &(),
            ) -> TxnResult<ControlFlow<u8>> {
                Ok(ControlFlow::Break(9))
            }
        }

        let ran = AtomicU32::new(0);
        let tx_loop = TransactionLoop::new(manager(), |_: &mut Transaction, _: &()| {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(1_u8)
        })
        .with_hooks(Stop);

        assert_eq!(tx_loop.run(&()).unwrap(), 9);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sleeps_between_retries_only() {
        let slept = Arc::new(AtomicU32::new(0));
        let s = Arc::clone(&slept);
        let tx_loop = TransactionLoop::new(manager(), |_: &mut Transaction, _: &()| {
            Err::<(), _>(TxnError::conflict("always"))
        })
        .with_config(LoopConfig::new().retries(3).sleep(Duration::from_millis(10)))
        .with_sleeper(move |delay| {
            assert_eq!(delay, Duration::from_millis(10));
            s.fetch_add(1, Ordering::SeqCst);
        });

        assert!(tx_loop.run(&()).is_err());
        assert_eq!(slept.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn no_sleep_configured_means_no_sleep() {
        let slept = Arc::new(AtomicU32::new(0));
        let s = Arc::clone(&slept);
        let tx_loop = TransactionLoop::new(manager(), |_: &mut Transaction, _: &()| {
            Err::<(), _>(TxnError::conflict("always"))
        })
        .with_config(LoopConfig::new().retries(2))
        .with_sleeper(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        assert!(tx_loop.run(&()).is_err());
        assert_eq!(slept.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn classifier_override_takes_precedence() {
        let mut classifier = RetryClassifier::new();
        classifier.register::<TxnError, _>(|e| matches!(e, TxnError::QueueFull));

        let calls = AtomicU32::new(0);
        let tx_loop = TransactionLoop::new(manager(), |_: &mut Transaction, _: &()| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(TxnError::QueueFull);
            }
            Ok(())
        })
        .with_classifier(Arc::new(classifier));

        tx_loop.run(&()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
