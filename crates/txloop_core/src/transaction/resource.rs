//! The protocol spoken by resources enlisted in a transaction.

use crate::error::{TxnError, TxnResult};

/// A resource that participates in a transaction's two-phase commit.
///
/// The manager drives every joined resource through the same sequence:
///
/// 1. `tpc_begin(false)` when commit starts
/// 2. `vote()`; any error aborts the whole transaction
/// 3. `finish()` once every resource has voted
///
/// If the transaction aborts at any point before `finish`, `abort()` is
/// called instead. Resources are ordered by [`sort_key`](Self::sort_key)
/// with a stable sort, so resources sharing a key run in the order they
/// joined.
pub trait DataManager: Send {
    /// Key used to order resources during commit.
    fn sort_key(&self) -> String;

    /// Starts two-phase commit, or a nested transaction when
    /// `subtransaction` is true.
    fn tpc_begin(&mut self, subtransaction: bool) -> TxnResult<()> {
        if subtransaction {
            return Err(TxnError::unsupported("nested transactions"));
        }
        Ok(())
    }

    /// Checks whether the commit can proceed.
    fn vote(&mut self) -> TxnResult<()> {
        Ok(())
    }

    /// Applies the resource's effects. Must not fail once voting succeeded;
    /// errors are logged and ignored.
    fn finish(&mut self) -> TxnResult<()>;

    /// Discards the resource's effects.
    fn abort(&mut self) {}
}
