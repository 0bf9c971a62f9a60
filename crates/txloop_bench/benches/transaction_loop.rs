//! Transaction loop overhead benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use txloop_core::{
    enqueue_transactionally, CallbackHooks, LoopConfig, MemoryQueue, Transaction,
    TransactionLoop, TransactionManager, TxnError, TxnResult,
};

/// Benchmark a loop whose handler commits on the first attempt.
fn bench_single_attempt(c: &mut Criterion) {
    let manager = Arc::new(TransactionManager::new());
    let queue = Arc::new(MemoryQueue::new());
    let q = Arc::clone(&queue);
    let tx_loop = TransactionLoop::new(manager, move |txn: &mut Transaction, n: &u64| -> TxnResult<u64> {
        enqueue_transactionally(txn, &q, *n)?;
        Ok(*n)
    });

    c.bench_function("loop_single_attempt", |b| {
        b.iter(|| {
            tx_loop.run(black_box(&7)).unwrap();
            queue.drain()
        });
    });
}

/// Benchmark a read-only loop that aborts without committing.
fn bench_side_effect_free(c: &mut Criterion) {
    let manager = Arc::new(TransactionManager::new());
    let tx_loop = TransactionLoop::new(manager, |_: &mut Transaction, n: &u64| -> TxnResult<u64> {
        Ok(n * 2)
    })
    .with_config(LoopConfig::new().side_effect_free(true));

    c.bench_function("loop_side_effect_free", |b| {
        b.iter(|| tx_loop.run(black_box(&21)).unwrap());
    });
}

/// Benchmark a loop that retries conflicts before succeeding.
fn bench_retries(c: &mut Criterion) {
    let manager = Arc::new(TransactionManager::new());
    let hooks = CallbackHooks::new().describe(|_: &u32| "bench retries".to_string());
    let tx_loop = TransactionLoop::new(manager, |txn: &mut Transaction, failures: &u32| -> TxnResult<()> {
        // Transaction ids grow per attempt; fail until enough have passed.
        if txn.id().as_u64() % u64::from(*failures + 1) != 0 {
            return Err(TxnError::conflict("bench"));
        }
        Ok(())
    })
    .with_hooks(hooks)
    .with_config(LoopConfig::new().retries(8));

    c.bench_function("loop_with_retries", |b| {
        b.iter(|| tx_loop.run(black_box(&3)).unwrap());
    });
}

criterion_group!(benches, bench_single_attempt, bench_side_effect_free, bench_retries);
criterion_main!(benches);
