//! Customization points of the transaction loop.

use crate::config::LoopConfig;
use crate::error::TxnResult;
use crate::transaction::Transaction;
use std::fmt;
use std::ops::ControlFlow;

/// Description used when a loop does not describe its transactions.
pub const UNKNOWN_DESCRIPTION: &str = "Unknown";

/// Decisions a [`TransactionLoop`](crate::TransactionLoop) delegates to its
/// owner.
///
/// Every method has a default, so implementors override only what they
/// need. `A` is the argument type passed to the loop and `T` the handler's
/// result type.
pub trait LoopHooks<A: ?Sized, T> {
    /// Text noted on every transaction the loop begins.
    fn describe_transaction(&self, _args: &A) -> String {
        UNKNOWN_DESCRIPTION.to_string()
    }

    /// Runs before every attempt that is not the last one.
    ///
    /// `attempts_remaining` counts the attempts left after this one.
    /// Returning `ControlFlow::Break(result)` aborts the transaction and
    /// makes the loop return `result` without running the handler.
    fn prep_for_retry(
        &self,
        _attempts_remaining: u32,
        _txn: &mut Transaction,
        _args: &A,
    ) -> TxnResult<ControlFlow<T>> {
        Ok(ControlFlow::Continue(()))
    }

    /// Returns true to abort instead of committing, still returning the
    /// handler's result.
    ///
    /// The aborted transaction discards every deferred action, but the
    /// computed value is still handed back to the caller. Read-only work
    /// uses this to skip commit entirely. The default answers with
    /// the `side_effect_free` flag of [`LoopConfig`]; an override replaces it.
    fn should_abort_due_to_no_side_effects(&self, config: &LoopConfig, _args: &A) -> bool {
        config.side_effect_free
    }

    /// Returns true to abort instead of committing, still returning `result`.
    fn should_veto_commit(&self, _result: &T, _args: &A) -> bool {
        false
    }
}

/// Hooks that keep every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl<A: ?Sized, T> LoopHooks<A, T> for DefaultHooks {}

type DescribeFn<A> = Box<dyn Fn(&A) -> String + Send + Sync>;
type PrepFn<A, T> = Box<dyn Fn(u32, &mut Transaction, &A) -> TxnResult<ControlFlow<T>> + Send + Sync>;
type SideEffectFreeFn<A> = Box<dyn Fn(&A) -> bool + Send + Sync>;
type VetoFn<A, T> = Box<dyn Fn(&T, &A) -> bool + Send + Sync>;

/// Hooks assembled from closures.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use txloop_core::{CallbackHooks, TransactionLoop, TransactionManager, TxnResult, Transaction};
///
/// let hooks = CallbackHooks::new()
///     .describe(|name: &str| format!("greet {name}"))
///     .veto(|greeting: &String, _: &str| greeting.is_empty());
///
/// let greet = |_: &mut Transaction, name: &str| -> TxnResult<String> { Ok(format!("hello {name}")) };
/// let tx_loop = TransactionLoop::new(Arc::new(TransactionManager::new()), greet).with_hooks(hooks);
///
/// assert_eq!(tx_loop.run("bob").unwrap(), "hello bob");
/// ```
pub struct CallbackHooks<A: ?Sized, T> {
    describe: Option<DescribeFn<A>>,
    prep: Option<PrepFn<A, T>>,
    side_effect_free: Option<SideEffectFreeFn<A>>,
    veto: Option<VetoFn<A, T>>,
}

impl<A: ?Sized, T> CallbackHooks<A, T> {
    /// Creates hooks with every default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            describe: None,
            prep: None,
            side_effect_free: None,
            veto: None,
        }
    }

    /// Sets the transaction description callback.
    #[must_use]
    pub fn describe<F>(mut self, f: F) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        self.describe = Some(Box::new(f));
        self
    }

    /// Sets the retry preparation callback.
    #[must_use]
    pub fn prep_for_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, &mut Transaction, &A) -> TxnResult<ControlFlow<T>> + Send + Sync + 'static,
    {
        self.prep = Some(Box::new(f));
        self
    }

    /// Sets the side-effect-free predicate, replacing the config flag.
    #[must_use]
    pub fn side_effect_free<F>(mut self, f: F) -> Self
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.side_effect_free = Some(Box::new(f));
        self
    }

    /// Sets the commit veto predicate.
    #[must_use]
    pub fn veto<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &A) -> bool + Send + Sync + 'static,
    {
        self.veto = Some(Box::new(f));
        self
    }
}

impl<A: ?Sized, T> Default for CallbackHooks<A, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized, T> LoopHooks<A, T> for CallbackHooks<A, T> {
    fn describe_transaction(&self, args: &A) -> String {
        match &self.describe {
            Some(describe) => describe(args),
            None => UNKNOWN_DESCRIPTION.to_string(),
        }
    }

    fn prep_for_retry(
        &self,
        attempts_remaining: u32,
        txn: &mut Transaction,
        args: &A,
    ) -> TxnResult<ControlFlow<T>> {
        match &self.prep {
            Some(prep) => prep(attempts_remaining, txn, args),
            None => Ok(ControlFlow::Continue(())),
        }
    }

    fn should_abort_due_to_no_side_effects(&self, config: &LoopConfig, args: &A) -> bool {
        match &self.side_effect_free {
            Some(side_effect_free) => side_effect_free(args),
            None => config.side_effect_free,
        }
    }

    fn should_veto_commit(&self, result: &T, args: &A) -> bool {
        self.veto.as_ref().is_some_and(|f| f(result, args))
    }
}

impl<A: ?Sized, T> fmt::Debug for CallbackHooks<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHooks")
            .field("describe", &self.describe.is_some())
            .field("prep_for_retry", &self.prep.is_some())
            .field("side_effect_free", &self.side_effect_free.is_some())
            .field("veto", &self.veto.is_some())
            .finish()
    }
}
