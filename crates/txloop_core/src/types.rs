//! Core type definitions for txloop.

use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Why the loop aborted a transaction but still returned the handler result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The work was declared free of side effects; committing is pointless.
    SideEffectFree,
    /// The transaction was doomed or a hook vetoed the commit.
    DoomedOrVetoed,
    /// The retry preparation hook asked to stop.
    PreparationRequested,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SideEffectFree => write!(f, "side-effect free"),
            Self::DoomedOrVetoed => write!(f, "doomed or vetoed"),
            Self::PreparationRequested => write!(f, "requested by retry preparation"),
        }
    }
}
