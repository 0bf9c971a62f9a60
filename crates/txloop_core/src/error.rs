//! Error types for txloop core.

use std::error::Error as StdError;
use thiserror::Error;

/// Boxed error produced by application handlers and deferred actions.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for transaction operations.
pub type TxnResult<T> = Result<T, TxnError>;

/// Errors that can occur while running transactions.
#[derive(Debug, Error)]
pub enum TxnError {
    /// A deferred action could not resolve a callable.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the misconfiguration.
        message: String,
    },

    /// A bounded queue is at capacity.
    #[error("queue is full")]
    QueueFull,

    /// A concurrency conflict that is safe to retry.
    #[error("transaction conflict: {reason}")]
    Conflict {
        /// What conflicted.
        reason: String,
    },

    /// The transaction was doomed and can only be aborted.
    #[error("transaction is doomed")]
    Doomed,

    /// The transaction is already in an inconsistent state.
    #[error("invalid transaction state: {message}")]
    InvalidState {
        /// Description of the state problem.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Operation is not supported by an enlisted resource.
    #[error("unsupported operation: {message}")]
    UnsupportedOperation {
        /// The refused operation.
        message: String,
    },

    /// The process was asked to exit.
    #[error("exit requested with code {code}")]
    Exit {
        /// Requested exit status.
        code: i32,
    },

    /// Error raised by application code.
    #[error("{0}")]
    Application(#[source] BoxError),
}

impl TxnError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a retryable conflict error.
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// Creates an exit signal.
    pub fn exit(code: i32) -> Self {
        Self::Exit { code }
    }

    /// Wraps an application error.
    pub fn application(err: impl Into<BoxError>) -> Self {
        Self::Application(err.into())
    }

    /// Returns true for the process-exit signal.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Exit { .. })
    }

    /// Returns true if the error reports a transaction already in an
    /// inconsistent state.
    #[must_use]
    pub fn is_inconsistent_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Returns the wrapped application error if it is of type `E`.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Application(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}
