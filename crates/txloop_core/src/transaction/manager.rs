//! Transaction manager.

use crate::error::{TxnError, TxnResult};
use crate::retry::RetryClassifier;
use crate::stats::TransactionStats;
use crate::transaction::resource::DataManager;
use crate::transaction::state::{Transaction, TransactionState};
use crate::types::TransactionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Begins, commits and aborts transactions.
///
/// Commit is a two-phase protocol over the transaction's enlisted
/// resources:
/// - resources are stable-sorted by their sort key
/// - every resource votes; the first failure aborts all of them
/// - every resource finishes; failures at this point are logged and ignored
///
/// The manager also owns the [`RetryClassifier`] that decides which
/// failures a [`TransactionLoop`](crate::TransactionLoop) may retry.
pub struct TransactionManager {
    /// Next transaction ID.
    next_txid: AtomicU64,
    /// Which failures are retryable.
    classifier: Arc<RetryClassifier>,
    /// Lifetime counters.
    stats: TransactionStats,
}

impl TransactionManager {
    /// Creates a manager that only retries conflicts.
    pub fn new() -> Self {
        Self::with_classifier(Arc::new(RetryClassifier::new()))
    }

    /// Creates a manager with a custom retry classifier.
    pub fn with_classifier(classifier: Arc<RetryClassifier>) -> Self {
        Self {
            next_txid: AtomicU64::new(1),
            classifier,
            stats: TransactionStats::new(),
        }
    }

    /// Begins a new transaction.
    pub fn begin(&self) -> Transaction {
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        self.stats.record_start();
        debug!(txid = %txid, "transaction begun");
        Transaction::new(txid)
    }

    /// Commits a transaction.
    ///
    /// Committing a transaction that is not active reports
    /// [`TxnError::InvalidState`]. A doomed transaction is aborted and
    /// reports [`TxnError::Doomed`]. A failed vote aborts the transaction
    /// and returns the vote's error.
    pub fn commit(&self, txn: &mut Transaction) -> TxnResult<()> {
        if !txn.is_active() {
            return Err(TxnError::invalid_state(format!(
                "cannot commit {} in state {:?}",
                txn.id(),
                txn.state()
            )));
        }

        if txn.is_doomed() {
            let resources = txn.take_resources();
            self.abort_resources(txn, resources);
            return Err(TxnError::Doomed);
        }

        txn.set_state(TransactionState::Committing);

        let mut resources: Vec<(String, Box<dyn DataManager>)> = txn
            .take_resources()
            .into_iter()
            .map(|resource| (resource.sort_key(), resource))
            .collect();
        // Stable: resources sharing a key keep their join order.
        resources.sort_by(|a, b| a.0.cmp(&b.0));

        if let Err(err) = Self::vote_all(&mut resources) {
            debug!(txid = %txn.id(), error = %err, "vote failed; aborting");
            self.abort_resources(txn, resources.into_iter().map(|(_, r)| r).collect());
            return Err(err);
        }

        for (key, resource) in &mut resources {
            if let Err(err) = resource.finish() {
                error!(
                    txid = %txn.id(),
                    sort_key = %key,
                    error = %err,
                    "resource failed after a successful vote; ignoring"
                );
            }
        }

        txn.set_state(TransactionState::Committed);
        self.stats.record_commit();
        debug!(txid = %txn.id(), resources = resources.len(), "transaction committed");
        Ok(())
    }

    /// Aborts a transaction.
    ///
    /// Every enlisted resource discards its effects.
    pub fn abort(&self, txn: &mut Transaction) -> TxnResult<()> {
        if !txn.is_active() {
            return Err(TxnError::invalid_state(format!(
                "cannot abort {} in state {:?}",
                txn.id(),
                txn.state()
            )));
        }
        let resources = txn.take_resources();
        self.abort_resources(txn, resources);
        Ok(())
    }

    /// Classifies a failure using this manager's classifier.
    #[must_use]
    pub fn is_retryable(&self, err: &TxnError) -> bool {
        self.classifier.is_retryable(err)
    }

    /// Returns the retry classifier.
    #[must_use]
    pub fn classifier(&self) -> &Arc<RetryClassifier> {
        &self.classifier
    }

    /// Returns lifetime counters.
    #[must_use]
    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    fn vote_all(resources: &mut [(String, Box<dyn DataManager>)]) -> TxnResult<()> {
        for (_, resource) in resources.iter_mut() {
            resource.tpc_begin(false)?;
        }
        for (_, resource) in resources.iter_mut() {
            resource.vote()?;
        }
        Ok(())
    }

    fn abort_resources(&self, txn: &mut Transaction, mut resources: Vec<Box<dyn DataManager>>) {
        for resource in &mut resources {
            resource.abort();
        }
        txn.set_state(TransactionState::Aborted);
        self.stats.record_abort();
        debug!(txid = %txn.id(), resources = resources.len(), "transaction aborted");
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("stats", &self.stats.snapshot())
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records every protocol call into a shared log.
    struct Recorder {
        name: &'static str,
        key: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_vote: bool,
        fail_finish: bool,
    }

    impl Recorder {
        fn boxed(name: &'static str, key: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                name,
                key,
                log: Arc::clone(log),
                fail_vote: false,
                fail_finish: false,
            })
        }
    }

    impl DataManager for Recorder {
        fn sort_key(&self) -> String {
            self.key.to_string()
        }

        fn vote(&mut self) -> TxnResult<()> {
            self.log.lock().push(format!("vote:{}", self.name));
            if self.fail_vote {
                return Err(TxnError::QueueFull);
            }
            Ok(())
        }

        fn finish(&mut self) -> TxnResult<()> {
            self.log.lock().push(format!("finish:{}", self.name));
            if self.fail_finish {
                return Err(TxnError::invalid_operation("late failure"));
            }
            Ok(())
        }

        fn abort(&mut self) {
            self.log.lock().push(format!("abort:{}", self.name));
        }
    }

    fn new_log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn begin_assigns_increasing_ids() {
        let tm = TransactionManager::new();
        let a = tm.begin();
        let b = tm.begin();
        assert!(a.id() < b.id());
        assert_eq!(tm.stats().snapshot().started, 2);
    }

    #[test]
    fn commit_empty_transaction() {
        let tm = TransactionManager::new();
        let mut txn = tm.begin();
        tm.commit(&mut txn).unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert_eq!(tm.stats().snapshot().committed, 1);
    }

    #[test]
    fn commit_votes_all_before_finishing_any() {
        let tm = TransactionManager::new();
        let log = new_log();
        let mut txn = tm.begin();
        txn.join(Recorder::boxed("a", "k", &log)).unwrap();
        txn.join(Recorder::boxed("b", "k", &log)).unwrap();
        tm.commit(&mut txn).unwrap();

        assert_eq!(
            *log.lock(),
            vec!["vote:a", "vote:b", "finish:a", "finish:b"]
        );
        assert_eq!(txn.resource_count(), 0);
    }

    #[test]
    fn commit_orders_by_sort_key_then_join_order() {
        let tm = TransactionManager::new();
        let log = new_log();
        let mut txn = tm.begin();
        txn.join(Recorder::boxed("z1", "z", &log)).unwrap();
        txn.join(Recorder::boxed("a1", "a", &log)).unwrap();
        txn.join(Recorder::boxed("z2", "z", &log)).unwrap();
        txn.join(Recorder::boxed("a2", "a", &log)).unwrap();
        tm.commit(&mut txn).unwrap();

        let finishes: Vec<String> = log
            .lock()
            .iter()
            .filter(|e| e.starts_with("finish:"))
            .cloned()
            .collect();
        assert_eq!(finishes, vec!["finish:a1", "finish:a2", "finish:z1", "finish:z2"]);
    }

    #[test]
    fn failed_vote_aborts_every_resource() {
        let tm = TransactionManager::new();
        let log = new_log();
        let mut txn = tm.begin();
        txn.join(Recorder::boxed("a", "1", &log)).unwrap();
        let mut failing = Recorder::boxed("b", "2", &log);
        failing.fail_vote = true;
        txn.join(failing).unwrap();

        let result = tm.commit(&mut txn);
        assert!(matches!(result, Err(TxnError::QueueFull)));
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert_eq!(
            *log.lock(),
            vec!["vote:a", "vote:b", "abort:a", "abort:b"]
        );
        assert_eq!(tm.stats().snapshot().aborted, 1);
    }

    #[test]
    fn finish_failure_is_swallowed() {
        let tm = TransactionManager::new();
        let log = new_log();
        let mut txn = tm.begin();
        let mut failing = Recorder::boxed("a", "1", &log);
        failing.fail_finish = true;
        txn.join(failing).unwrap();
        txn.join(Recorder::boxed("b", "2", &log)).unwrap();

        tm.commit(&mut txn).unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(log.lock().contains(&"finish:b".to_string()));
    }

    #[test]
    fn doomed_transaction_cannot_commit() {
        let tm = TransactionManager::new();
        let log = new_log();
        let mut txn = tm.begin();
        txn.join(Recorder::boxed("a", "1", &log)).unwrap();
        txn.doom();

        let result = tm.commit(&mut txn);
        assert!(matches!(result, Err(TxnError::Doomed)));
        assert_eq!(*log.lock(), vec!["abort:a"]);
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn abort_discards_resources() {
        let tm = TransactionManager::new();
        let log = new_log();
        let mut txn = tm.begin();
        txn.join(Recorder::boxed("a", "1", &log)).unwrap();
        tm.abort(&mut txn).unwrap();

        assert_eq!(*log.lock(), vec!["abort:a"]);
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn cannot_commit_twice() {
        let tm = TransactionManager::new();
        let mut txn = tm.begin();
        tm.commit(&mut txn).unwrap();

        let result = tm.commit(&mut txn);
        assert!(matches!(result, Err(TxnError::InvalidState { .. })));
    }

    #[test]
    fn cannot_abort_after_commit() {
        let tm = TransactionManager::new();
        let mut txn = tm.begin();
        tm.commit(&mut txn).unwrap();

        let result = tm.abort(&mut txn);
        assert!(matches!(result, Err(TxnError::InvalidState { .. })));
    }

    #[test]
    fn classifier_is_consulted() {
        let mut classifier = RetryClassifier::new();
        classifier.register::<TxnError, _>(|e| matches!(e, TxnError::QueueFull));
        let tm = TransactionManager::with_classifier(Arc::new(classifier));

        assert!(tm.is_retryable(&TxnError::QueueFull));
        assert!(!tm.is_retryable(&TxnError::Doomed));
    }
}
