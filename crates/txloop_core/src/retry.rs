//! Classification of errors as retryable.
//!
//! Which failures are safe to retry depends on the storage behind a
//! transaction, so the set is pluggable. [`TxnError::Conflict`] is always
//! retryable; additional error types are registered with a predicate.

use crate::error::TxnError;
use std::error::Error as StdError;
use std::fmt;

type Predicate = Box<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// Decides whether a failed attempt may be retried with a fresh transaction.
///
/// # Example
///
/// ```rust
/// use txloop_core::{RetryClassifier, TxnError};
///
/// let mut classifier = RetryClassifier::new();
/// classifier.register::<TxnError, _>(|e| matches!(e, TxnError::QueueFull));
///
/// assert!(classifier.is_retryable(&TxnError::QueueFull));
/// assert!(classifier.is_retryable(&TxnError::conflict("write skew")));
/// assert!(!classifier.is_retryable(&TxnError::Doomed));
/// ```
#[derive(Default)]
pub struct RetryClassifier {
    predicates: Vec<(&'static str, Predicate)>,
}

impl RetryClassifier {
    /// Creates a classifier that only retries conflicts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a predicate for errors of type `E`.
    ///
    /// The predicate sees every error of type `E` found in the failure or
    /// its `source()` chain.
    pub fn register<E, F>(&mut self, predicate: F) -> &mut Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let check: Predicate = Box::new(move |err| err.downcast_ref::<E>().is_some_and(&predicate));
        self.predicates.push((std::any::type_name::<E>(), check));
        self
    }

    /// Treats every error of type `E` as retryable.
    pub fn register_type<E>(&mut self) -> &mut Self
    where
        E: StdError + 'static,
    {
        self.register::<E, _>(|_| true)
    }

    /// Returns the number of registered predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Returns true if nothing beyond the built-in rules is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Classifies a failure.
    #[must_use]
    pub fn is_retryable(&self, err: &TxnError) -> bool {
        match err {
            TxnError::Conflict { .. } => return true,
            TxnError::Exit { .. }
            | TxnError::InvalidState { .. }
            | TxnError::Configuration { .. }
            | TxnError::UnsupportedOperation { .. } => return false,
            _ => {}
        }

        let mut current: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(candidate) = current {
            if self.predicates.iter().any(|(_, check)| check(candidate)) {
                return true;
            }
            current = candidate.source();
        }
        false
    }
}

impl fmt::Debug for RetryClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.predicates.iter().map(|(name, _)| *name).collect();
        f.debug_struct("RetryClassifier")
            .field("registered", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Deadlock {
        transient: bool,
    }

    impl fmt::Display for Deadlock {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "deadlock (transient: {})", self.transient)
        }
    }

    impl StdError for Deadlock {}

    #[derive(Debug)]
    struct Wrapper(Deadlock);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "wrapped")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn conflicts_are_retryable_by_default() {
        let classifier = RetryClassifier::new();
        assert!(classifier.is_empty());
        assert!(classifier.is_retryable(&TxnError::conflict("version mismatch")));
        assert!(!classifier.is_retryable(&TxnError::QueueFull));
        assert!(!classifier.is_retryable(&TxnError::application(Deadlock { transient: true })));
    }

    #[test]
    fn registered_predicate_decides() {
        let mut classifier = RetryClassifier::new();
        classifier.register::<Deadlock, _>(|e| e.transient);

        assert!(classifier.is_retryable(&TxnError::application(Deadlock { transient: true })));
        assert!(!classifier.is_retryable(&TxnError::application(Deadlock { transient: false })));
    }

    #[test]
    fn source_chain_is_searched() {
        let mut classifier = RetryClassifier::new();
        classifier.register_type::<Deadlock>();

        let err = TxnError::application(Wrapper(Deadlock { transient: false }));
        assert!(classifier.is_retryable(&err));
    }

    #[test]
    fn fatal_variants_ignore_registrations() {
        let mut classifier = RetryClassifier::new();
        classifier.register_type::<TxnError>();

        assert!(classifier.is_retryable(&TxnError::QueueFull));
        assert!(!classifier.is_retryable(&TxnError::exit(0)));
        assert!(!classifier.is_retryable(&TxnError::invalid_state("commit twice")));
        assert!(!classifier.is_retryable(&TxnError::configuration("no callable")));
        assert!(!classifier.is_retryable(&TxnError::unsupported("nested")));
    }

    #[test]
    fn debug_lists_registered_types() {
        let mut classifier = RetryClassifier::new();
        classifier.register_type::<Deadlock>();
        assert_eq!(classifier.len(), 1);
        assert!(format!("{classifier:?}").contains("Deadlock"));
    }
}
