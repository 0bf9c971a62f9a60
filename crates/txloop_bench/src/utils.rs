//! Benchmark utilities.

use std::sync::Arc;
use txloop_core::{DataManager, MemoryQueue, TxnResult};

/// Generate a batch of payload strings.
pub fn generate_items(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("item-{i:06}")).collect()
}

/// Create `count` unbounded queues.
pub fn generate_queues(count: usize) -> Vec<Arc<MemoryQueue<String>>> {
    (0..count).map(|_| Arc::new(MemoryQueue::new())).collect()
}

/// A resource that does nothing in every phase.
#[derive(Debug)]
pub struct NoopResource(pub String);

impl DataManager for NoopResource {
    fn sort_key(&self) -> String {
        self.0.clone()
    }

    fn finish(&mut self) -> TxnResult<()> {
        Ok(())
    }
}
