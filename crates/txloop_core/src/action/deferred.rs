//! Deferred actions: work that runs only when a transaction commits.

use crate::error::{TxnError, TxnResult};
use crate::transaction::{DataManager, Transaction};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Work deferred until commit.
type Callable = Box<dyn FnOnce() -> TxnResult<()> + Send>;

/// The object a deferred action belongs to.
pub type Target = Arc<dyn Any + Send + Sync>;

/// Turns a target into a callable, or `None` if the target has the wrong type.
type Binder = Box<dyn FnOnce(Target) -> Option<Callable> + Send>;

/// Identity source for actions that have no target.
static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// A side effect that runs at most once, when its transaction commits.
///
/// The action runs during the finish phase of commit. If the transaction
/// aborts, or a vote fails, it never runs. An optional vote callback runs
/// during the voting phase and can abort the transaction by returning an
/// error.
///
/// Actions that share a target share a sort key, so they run in the order
/// they were enlisted.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use txloop_core::{DeferredAction, TransactionManager};
///
/// let manager = TransactionManager::new();
/// let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
///
/// let mut txn = manager.begin();
/// DeferredAction::builder()
///     .target(Arc::clone(&log))
///     .method(|log: &Mutex<Vec<String>>| {
///         log.lock().push("committed".to_string());
///         Ok(())
///     })
///     .enlist(&mut txn)
///     .unwrap();
/// assert!(log.lock().is_empty());
///
/// manager.commit(&mut txn).unwrap();
/// assert_eq!(*log.lock(), vec!["committed"]);
/// ```
pub struct DeferredAction {
    target: Option<Target>,
    action: Option<Callable>,
    vote: Option<Callable>,
    sort_key: String,
}

impl DeferredAction {
    /// Starts building a deferred action.
    #[must_use]
    pub fn builder() -> DeferredActionBuilder {
        DeferredActionBuilder::default()
    }

    /// Creates a target-less action from a closure.
    pub fn call<F>(call: F) -> Self
    where
        F: FnOnce() -> TxnResult<()> + Send + 'static,
    {
        Self {
            target: None,
            action: Some(Box::new(call)),
            vote: None,
            sort_key: action_key(),
        }
    }

    /// Returns the object this action belongs to, if any.
    #[must_use]
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Returns true until the action has run or been discarded.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.action.is_some()
    }

    /// Enlists this action in a transaction.
    pub fn enlist(self, txn: &mut Transaction) -> TxnResult<()> {
        txn.join(Box::new(self))
    }
}

impl DataManager for DeferredAction {
    fn sort_key(&self) -> String {
        self.sort_key.clone()
    }

    fn vote(&mut self) -> TxnResult<()> {
        match self.vote.take() {
            Some(vote) => vote(),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> TxnResult<()> {
        match self.action.take() {
            Some(action) => action(),
            None => Ok(()),
        }
    }

    fn abort(&mut self) {
        self.action = None;
        self.vote = None;
    }
}

impl fmt::Debug for DeferredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredAction")
            .field("sort_key", &self.sort_key)
            .field("has_target", &self.target.is_some())
            .field("pending", &self.is_pending())
            .field("has_vote", &self.vote.is_some())
            .finish()
    }
}

/// Builder for [`DeferredAction`].
///
/// Either `method` (which needs a `target` of the matching type) or `call`
/// must be given. When both are given, `method` wins.
#[derive(Default)]
pub struct DeferredActionBuilder {
    target: Option<Target>,
    method: Option<Binder>,
    call: Option<Callable>,
    vote: Option<Callable>,
}

impl DeferredActionBuilder {
    /// Sets the object the action belongs to.
    ///
    /// The target determines ordering: actions with the same target run in
    /// enlistment order.
    #[must_use]
    pub fn target<T>(mut self, target: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        self.target = Some(target);
        self
    }

    /// Runs `method` against the target at commit.
    #[must_use]
    pub fn method<T, F>(mut self, method: F) -> Self
    where
        T: Any + Send + Sync,
        F: FnOnce(&T) -> TxnResult<()> + Send + 'static,
    {
        self.method = Some(Box::new(move |target: Target| {
            let typed = target.downcast::<T>().ok()?;
            let bound: Callable = Box::new(move || method(&*typed));
            Some(bound)
        }));
        self
    }

    /// Runs `call` at commit.
    #[must_use]
    pub fn call<F>(mut self, call: F) -> Self
    where
        F: FnOnce() -> TxnResult<()> + Send + 'static,
    {
        self.call = Some(Box::new(call));
        self
    }

    /// Runs `vote` during the voting phase; an error aborts the transaction.
    #[must_use]
    pub fn vote<F>(mut self, vote: F) -> Self
    where
        F: FnOnce() -> TxnResult<()> + Send + 'static,
    {
        self.vote = Some(Box::new(vote));
        self
    }

    /// Resolves the callable and builds the action.
    pub fn build(self) -> TxnResult<DeferredAction> {
        let action = match (self.method, &self.target) {
            (Some(bind), Some(target)) => bind(Arc::clone(target)).ok_or_else(|| {
                TxnError::configuration("method does not accept the given target type")
            })?,
            (Some(_), None) => {
                return Err(TxnError::configuration("method requires a target"));
            }
            (None, _) => self.call.ok_or_else(|| {
                TxnError::configuration("deferred action needs a method or a call")
            })?,
        };

        let sort_key = match &self.target {
            Some(target) => target_key(target),
            None => action_key(),
        };

        Ok(DeferredAction {
            target: self.target,
            action: Some(action),
            vote: self.vote,
            sort_key,
        })
    }

    /// Builds the action and enlists it in `txn`.
    pub fn enlist(self, txn: &mut Transaction) -> TxnResult<()> {
        self.build()?.enlist(txn)
    }
}

impl fmt::Debug for DeferredActionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredActionBuilder")
            .field("has_target", &self.target.is_some())
            .field("has_method", &self.method.is_some())
            .field("has_call", &self.call.is_some())
            .field("has_vote", &self.vote.is_some())
            .finish()
    }
}

/// Enlists a deferred action in `txn`.
pub fn enlist(txn: &mut Transaction, action: DeferredActionBuilder) -> TxnResult<()> {
    action.enlist(txn)
}

/// Runs `call` when `txn` commits.
pub fn call_at_commit<F>(txn: &mut Transaction, call: F) -> TxnResult<()>
where
    F: FnOnce() -> TxnResult<()> + Send + 'static,
{
    DeferredAction::call(call).enlist(txn)
}

/// Sort key derived from the target's identity.
///
/// Every action on the same target shares it, so the stable commit sort
/// keeps them in enlistment order.
pub(crate) fn target_key(target: &Target) -> String {
    let addr = Arc::as_ptr(target) as *const () as usize;
    format!("target:{addr:016x}")
}

/// Sort key for an action without a target. Increases with creation order.
fn action_key() -> String {
    let id = NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed);
    format!("action:{id:020}")
}
