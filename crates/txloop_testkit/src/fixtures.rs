//! Test fixtures and transaction helpers.
//!
//! Provides resources that record the commit protocol, handlers that fail
//! on a schedule, and an error type that a ready-made manager retries.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use txloop_core::{
    DataManager, RetryClassifier, Transaction, TransactionManager, TxnError, TxnResult,
};

/// One step of the commit protocol seen by a [`RecordingResource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// The resource voted.
    Vote(String),
    /// The resource applied its effects.
    Finish(String),
    /// The resource discarded its effects.
    Abort(String),
}

/// Shared, ordered log of [`ResourceEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ResourceEvent>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resource that records into this log.
    pub fn resource(&self, name: &str, sort_key: &str) -> Box<RecordingResource> {
        Box::new(RecordingResource {
            name: name.to_string(),
            sort_key: sort_key.to_string(),
            log: self.clone(),
            fail_vote: false,
        })
    }

    /// Creates a resource whose vote fails with a conflict.
    pub fn failing_resource(&self, name: &str, sort_key: &str) -> Box<RecordingResource> {
        let mut resource = self.resource(name, sort_key);
        resource.fail_vote = true;
        resource
    }

    /// Returns a copy of every event so far.
    pub fn events(&self) -> Vec<ResourceEvent> {
        self.events.lock().clone()
    }

    /// Names of resources that finished, in order.
    pub fn finished(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ResourceEvent::Finish(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of resources that aborted, in order.
    pub fn aborted(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ResourceEvent::Abort(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ResourceEvent) {
        self.events.lock().push(event);
    }
}

/// A resource that records every protocol call into an [`EventLog`].
#[derive(Debug)]
pub struct RecordingResource {
    name: String,
    sort_key: String,
    log: EventLog,
    fail_vote: bool,
}

impl DataManager for RecordingResource {
    fn sort_key(&self) -> String {
        self.sort_key.clone()
    }

    fn vote(&mut self) -> TxnResult<()> {
        self.log.push(ResourceEvent::Vote(self.name.clone()));
        if self.fail_vote {
            return Err(TxnError::conflict(format!("{} refused to vote", self.name)));
        }
        Ok(())
    }

    fn finish(&mut self) -> TxnResult<()> {
        self.log.push(ResourceEvent::Finish(self.name.clone()));
        Ok(())
    }

    fn abort(&mut self) {
        self.log.push(ResourceEvent::Abort(self.name.clone()));
    }
}

/// A failure that [`retrying_manager`] classifies as retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientError {
    /// Attempt number that produced the error.
    pub attempt: u32,
}

impl fmt::Display for TransientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transient failure on attempt {}", self.attempt)
    }
}

impl std::error::Error for TransientError {}

/// A failure no classifier in this crate retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermanentError;

impl fmt::Display for PermanentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permanent failure")
    }
}

impl std::error::Error for PermanentError {}

/// Creates a manager whose classifier retries [`TransientError`].
pub fn retrying_manager() -> Arc<TransactionManager> {
    let mut classifier = RetryClassifier::new();
    classifier.register_type::<TransientError>();
    Arc::new(TransactionManager::with_classifier(Arc::new(classifier)))
}

/// Counts handler invocations and fails the first `failures` of them.
#[derive(Debug)]
pub struct ScriptedHandler {
    failures: u32,
    calls: AtomicU32,
    permanent: bool,
}

impl ScriptedHandler {
    /// Fails `failures` times with [`TransientError`], then succeeds.
    pub fn transient(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            permanent: false,
        }
    }

    /// Fails `failures` times with [`PermanentError`], then succeeds.
    pub fn permanent(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            permanent: true,
        }
    }

    /// Number of times the handler has run.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Runs one attempt, returning the zero-based attempt number on success.
    pub fn call(&self, _txn: &mut Transaction) -> TxnResult<u32> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            if self.permanent {
                return Err(TxnError::application(PermanentError));
            }
            return Err(TxnError::application(TransientError { attempt }));
        }
        Ok(attempt)
    }
}

/// Runs `f` with a debug-level log subscriber scoped to the call.
pub fn with_test_logging<R>(f: impl FnOnce() -> R) -> R {
    txloop_core::logging::with_logging("txloop_core=debug", f)
}
