//! The transaction loop and its hooks.

mod hooks;
mod transaction_loop;

pub use hooks::{CallbackHooks, DefaultHooks, LoopHooks, UNKNOWN_DESCRIPTION};
pub use transaction_loop::{Sleeper, TransactionLoop};
