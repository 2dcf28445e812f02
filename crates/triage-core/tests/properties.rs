//! Property tests for budgeting, batching and log reduction.

use proptest::prelude::*;
use triage_core::budget::{ARTIFACT_BATCH_BOUNDS, STEP_BOUNDS, TEST_BOUNDS};
use triage_core::{
    allocate, estimate_tokens, ArtifactBatcher, ArtifactItem, BatcherConfig, ContextBudget,
    FailureCounts, HeadTailReducer, LogReducer,
};

fn items_strategy() -> impl Strategy<Value = Vec<ArtifactItem>> {
    prop::collection::vec(0usize..200_000, 0..40).prop_map(|sizes| {
        sizes
            .into_iter()
            .enumerate()
            .map(|(i, chars)| ArtifactItem::new(format!("artifacts/item-{i:03}.log"), "x".repeat(chars)))
            .collect()
    })
}

fn within((lo, hi): (u64, u64), value: u64) -> bool {
    lo <= value && value <= hi
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_batching_keeps_every_item_once_in_order(
        items in items_strategy(),
        ceiling in 20_000u64..150_000,
    ) {
        let expected: Vec<String> = items.iter().map(|i| i.path.clone()).collect();
        let batcher = ArtifactBatcher::new(BatcherConfig::default());
        let batches = batcher.pack(items, ceiling);

        let flattened: Vec<String> = batches.iter().flat_map(|b| b.paths()).collect();
        prop_assert_eq!(flattened, expected);

        for batch in &batches {
            prop_assert!(!batch.is_empty());
            if batch.items.iter().any(|i| batcher.item_cost(i) > ceiling) {
                prop_assert_eq!(batch.len(), 1);
            }
            if batch.oversize {
                prop_assert_eq!(batch.len(), 1);
            } else {
                prop_assert!(batch.estimated_tokens <= ceiling);
                let cost: u64 = batch.items.iter().map(|i| batcher.item_cost(i)).sum();
                prop_assert_eq!(
                    batch.estimated_tokens,
                    batcher.config().batch_overhead_tokens + cost
                );
            }
        }
    }

    #[test]
    fn test_allocation_is_deterministic_and_bounded(
        total in 1_000u64..2_000_000,
        steps in 0usize..50,
        tests in 0usize..200,
        artifacts_present in any::<bool>(),
    ) {
        let budget = ContextBudget::new(total, 0.15);
        let counts = FailureCounts { steps, tests, artifacts_present };
        let budgets = allocate(counts, &budget);

        prop_assert_eq!(budgets, allocate(counts, &budget));
        prop_assert!(within(STEP_BOUNDS, budgets.step));
        prop_assert!(within(TEST_BOUNDS, budgets.test));
        prop_assert!(within(ARTIFACT_BATCH_BOUNDS, budgets.artifact_batch));
        if steps >= tests {
            prop_assert!(budgets.step >= budgets.test);
        }
    }

    #[test]
    fn test_allocation_fits_usable_when_floors_do_not_bind(
        steps in 0usize..10,
        tests in 0usize..10,
        artifacts_present in any::<bool>(),
    ) {
        let counts = FailureCounts { steps, tests, artifacts_present };
        prop_assume!(counts.weighted_units() > 0);

        // Large enough that every per-unit share clears its floor.
        let budget = ContextBudget::new(
            ARTIFACT_BATCH_BOUNDS.0 * counts.weighted_units() * 2,
            0.15,
        );
        let budgets = allocate(counts, &budget);

        let used = budgets.step * steps as u64
            + budgets.test * tests as u64
            + if artifacts_present { budgets.artifact_batch } else { 0 };
        prop_assert!(used <= budget.usable_tokens, "{} > {}", used, budget.usable_tokens);
    }

    #[test]
    fn test_reduction_stays_within_ceiling(
        lines in prop::collection::vec("[ -~]{0,300}", 0..400),
        max_tokens in 1u64..3_000,
    ) {
        let text = lines.join("\n");
        let reduced = HeadTailReducer::default().reduce(&text, max_tokens, "build-log.txt");
        prop_assert!(estimate_tokens(&reduced) <= max_tokens);
        if estimate_tokens(&text) <= max_tokens {
            prop_assert_eq!(reduced, text);
        }
    }
}
