//! Transactions and the resources enlisted in them.
//!
//! A [`Transaction`] groups deferred work behind an all-or-nothing
//! boundary:
//! - **Deferral**: enlisted resources apply nothing until commit
//! - **Voting**: any resource can veto the commit before effects are applied
//! - **Ordering**: resources run in a deterministic, stable order

mod manager;
mod resource;
mod state;

pub use manager::TransactionManager;
pub use resource::DataManager;
pub use state::{Transaction, TransactionState};
