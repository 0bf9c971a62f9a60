//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for the items enqueued within one transaction.
pub fn item_sequence_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(any::<u32>(), 0..64)
}

/// Strategy for a retry count small enough to run quickly.
pub fn retries_strategy() -> impl Strategy<Value = u32> {
    0u32..8
}

/// Strategy for puts spread over several queues.
///
/// Each entry is `(queue index, item)` with the index below `queues`.
pub fn queue_plan_strategy(queues: usize) -> impl Strategy<Value = Vec<(usize, u32)>> {
    prop::collection::vec((0..queues.max(1), any::<u32>()), 0..128)
}

/// Strategy for the number of attempts a handler fails before succeeding.
pub fn failure_count_strategy() -> impl Strategy<Value = u32> {
    0u32..12
}

/// Proptest settings for the workspace's property tests: few cases, short
/// shrinking, so that the retry-loop properties stay fast.
#[must_use]
pub fn quick_config() -> ProptestConfig {
    ProptestConfig {
        cases: 32,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn queue_plan_respects_queue_count() {
        let mut runner = TestRunner::default();
        let plan = queue_plan_strategy(3)
            .new_tree(&mut runner)
            .expect("strategy failed")
            .current();
        assert!(plan.iter().all(|(queue, _)| *queue < 3));
    }

    #[test]
    fn retries_stay_small() {
        let mut runner = TestRunner::default();
        let retries = retries_strategy()
            .new_tree(&mut runner)
            .expect("strategy failed")
            .current();
        assert!(retries < 8);
    }

    proptest! {
        #![proptest_config(quick_config())]

        #[test]
        fn failure_counts_are_bounded(failures in failure_count_strategy()) {
            prop_assert!(failures < 12);
        }

        #[test]
        fn item_sequences_are_short(items in item_sequence_strategy()) {
            prop_assert!(items.len() < 64);
        }
    }
}
