//! Transaction state.

use crate::error::{TxnError, TxnResult};
use crate::transaction::resource::DataManager;
use crate::types::TransactionId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tracing::debug;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and accepts resources.
    Active,
    /// Two-phase commit is in progress.
    Committing,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// A unit of work.
///
/// A transaction is an owned value: the caller that begins it decides when
/// it is committed or aborted, and it is destroyed when it goes out of
/// scope. Dropping a transaction that is still active aborts every resource
/// it holds, so deferred work never leaks into a later transaction.
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    doomed: bool,
    description: String,
    resources: Vec<Box<dyn DataManager>>,
    /// Per-key counters shared by resources of this transaction.
    reservations: HashMap<String, Arc<AtomicUsize>>,
}

impl Transaction {
    /// Creates a new active transaction.
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            doomed: false,
            description: String::new(),
            resources: Vec::new(),
            reservations: HashMap::new(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Enlists a resource in this transaction.
    pub fn join(&mut self, resource: Box<dyn DataManager>) -> TxnResult<()> {
        self.ensure_active()?;
        self.resources.push(resource);
        Ok(())
    }

    /// Returns the number of enlisted resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Appends a line to the transaction description.
    pub fn note(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.description.is_empty() {
            self.description.push('\n');
        }
        self.description.push_str(text);
    }

    /// Returns the accumulated description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Marks the transaction so that it can only be aborted.
    pub fn doom(&mut self) {
        self.doomed = true;
    }

    /// Checks whether the transaction is doomed.
    #[must_use]
    pub fn is_doomed(&self) -> bool {
        self.doomed
    }

    /// Asks every enlisted resource to begin a nested transaction.
    ///
    /// Resources that cannot nest refuse with
    /// [`TxnError::UnsupportedOperation`].
    pub fn savepoint(&mut self) -> TxnResult<()> {
        self.ensure_active()?;
        for resource in &mut self.resources {
            resource.tpc_begin(true)?;
        }
        Ok(())
    }

    pub(crate) fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    /// Returns the counter shared by every resource of this transaction
    /// that asks for `key`.
    pub(crate) fn reservations(&mut self, key: &str) -> Arc<AtomicUsize> {
        Arc::clone(self.reservations.entry(key.to_string()).or_default())
    }

    /// Removes the enlisted resources, leaving the transaction empty.
    pub(crate) fn take_resources(&mut self) -> Vec<Box<dyn DataManager>> {
        std::mem::take(&mut self.resources)
    }

    fn ensure_active(&self) -> TxnResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committing => Err(TxnError::invalid_operation(
                "transaction is committing",
            )),
            TransactionState::Committed => Err(TxnError::invalid_operation(
                "transaction already committed",
            )),
            TransactionState::Aborted => {
                Err(TxnError::invalid_operation("transaction already aborted"))
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TransactionState::Active || self.resources.is_empty() {
            return;
        }
        debug!(
            txid = %self.id,
            resources = self.resources.len(),
            "dropping active transaction; aborting resources"
        );
        for resource in &mut self.resources {
            resource.abort();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("doomed", &self.doomed)
            .field("description", &self.description)
            .field("resources", &self.resources.len())
            .finish()
    }
}
