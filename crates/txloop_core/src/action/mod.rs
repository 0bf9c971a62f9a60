//! Work deferred until a transaction commits.

mod deferred;
mod queue;

pub use deferred::{call_at_commit, enlist, DeferredAction, DeferredActionBuilder, Target};
pub use queue::{enqueue_transactionally, BoundedQueue, MemoryQueue};
