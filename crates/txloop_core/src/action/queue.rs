//! Transactional puts into bounded queues.
//!
//! An item enqueued with [`enqueue_transactionally`] becomes visible only
//! after its transaction commits. The put happens exactly once, during the
//! finish phase; nothing is inserted while the handler runs, so there is
//! never a put to undo.

use crate::action::deferred::{target_key, DeferredAction, Target};
use crate::error::{TxnError, TxnResult};
use crate::transaction::Transaction;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A FIFO queue with non-blocking put and a capacity check.
pub trait BoundedQueue<T>: Send + Sync {
    /// Inserts an item, failing with [`TxnError::QueueFull`] at capacity.
    fn put_nowait(&self, item: T) -> TxnResult<()>;

    /// Returns true if a put would fail.
    fn is_full(&self) -> bool;

    /// Returns how many more items fit, or `None` if the queue cannot tell.
    ///
    /// The default only distinguishes full from not full.
    fn remaining_capacity(&self) -> Option<usize> {
        if self.is_full() {
            Some(0)
        } else {
            None
        }
    }
}

/// An in-memory FIFO queue, optionally bounded.
///
/// # Thread Safety
///
/// This queue is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use txloop_core::{BoundedQueue, MemoryQueue};
///
/// let queue = MemoryQueue::bounded(1);
/// queue.put_nowait("a").unwrap();
/// assert!(queue.is_full());
/// assert!(queue.put_nowait("b").is_err());
/// assert_eq!(queue.get_nowait(), Some("a"));
/// ```
#[derive(Debug)]
pub struct MemoryQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: Option<usize>,
}

impl<T> MemoryQueue<T> {
    /// Creates an unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: None,
        }
    }

    /// Creates a queue holding at most `capacity` items.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    /// Removes and returns the oldest item, if any.
    pub fn get_nowait(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Returns the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Returns the capacity, or `None` if unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Removes and returns every queued item in FIFO order.
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }
}

impl<T> Default for MemoryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> BoundedQueue<T> for MemoryQueue<T> {
    fn put_nowait(&self, item: T) -> TxnResult<()> {
        let mut items = self.items.lock();
        if self.capacity.is_some_and(|cap| items.len() >= cap) {
            return Err(TxnError::QueueFull);
        }
        items.push_back(item);
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.remaining_capacity() == Some(0)
    }

    fn remaining_capacity(&self) -> Option<usize> {
        self.capacity
            .map(|cap| cap.saturating_sub(self.items.lock().len()))
    }
}

/// Puts `item` into `queue` when `txn` commits.
///
/// The put is a deferred action whose target is the queue itself, so every
/// item enqueued into the same queue within one transaction arrives in
/// enqueue order. Each put reserves one slot when the transaction votes;
/// if the queue cannot hold every item this transaction puts into it, the
/// commit fails with [`TxnError::QueueFull`] and nothing is inserted.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use txloop_core::{enqueue_transactionally, MemoryQueue, TransactionManager};
///
/// let manager = TransactionManager::new();
/// let queue = Arc::new(MemoryQueue::new());
///
/// let mut txn = manager.begin();
/// enqueue_transactionally(&mut txn, &queue, "a").unwrap();
/// enqueue_transactionally(&mut txn, &queue, "b").unwrap();
/// assert!(queue.is_empty());
///
/// manager.commit(&mut txn).unwrap();
/// assert_eq!(queue.get_nowait(), Some("a"));
/// assert_eq!(queue.get_nowait(), Some("b"));
/// ```
pub fn enqueue_transactionally<T, Q>(txn: &mut Transaction, queue: &Arc<Q>, item: T) -> TxnResult<()>
where
    T: Send + 'static,
    Q: BoundedQueue<T> + Any,
{
    let put_target = Arc::clone(queue);
    let vote_target = Arc::clone(queue);
    let target: Target = Arc::clone(queue) as Target;
    let reserved = txn.reservations(&target_key(&target));

    DeferredAction::builder()
        .target(Arc::clone(queue))
        .call(move || put_target.put_nowait(item))
        .vote(move || {
            // Earlier puts into this queue have already reserved their slots.
            let ahead = reserved.fetch_add(1, Ordering::Relaxed);
            match vote_target.remaining_capacity() {
                Some(free) if ahead >= free => Err(TxnError::QueueFull),
                _ => Ok(()),
            }
        })
        .enlist(txn)
}
