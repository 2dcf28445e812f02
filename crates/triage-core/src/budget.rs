//! Token budget allocation.
//!
//! Turns the model's context window into per-category budgets. Everything
//! here is pure: the same inputs always produce the same budgets.

use serde::{Deserialize, Serialize};

/// Characters per token used by the size estimator.
pub const CHARS_PER_TOKEN: u64 = 4;

pub const STEP_BOUNDS: (u64, u64) = (10_000, 200_000);
pub const TEST_BOUNDS: (u64, u64) = (10_000, 80_000);
pub const ARTIFACT_BATCH_BOUNDS: (u64, u64) = (20_000, 150_000);

/// Fractions of the limit used when there is nothing to weigh.
const EMPTY_STEP_FRACTION: f64 = 0.20;
const EMPTY_TEST_FRACTION: f64 = 0.08;
const EMPTY_ARTIFACT_FRACTION: f64 = 0.08;

/// Floor for the per-artifact reduction target.
const MIN_TOKENS_PER_ARTIFACT: u64 = 1_000;
/// Share of the batch budget given to artifact content; the rest is JSON scaffolding.
const ARTIFACT_CONTENT_SHARE: f64 = 0.8;

/// Rough token count of `text` (ceil of chars / 4).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    /// Share of the context window held back for prompt and response overhead.
    pub reserved_fraction: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            reserved_fraction: 0.15,
        }
    }
}

/// Size limit of one job's reasoning calls. Derived once, then read-only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub total_tokens: u64,
    pub reserved_fraction: f64,
    pub usable_tokens: u64,
}

impl ContextBudget {
    pub fn new(total_tokens: u64, reserved_fraction: f64) -> Self {
        let reserved_fraction = reserved_fraction.clamp(0.0, 1.0);
        let reserved = (total_tokens as f64 * reserved_fraction) as u64;
        Self {
            total_tokens,
            reserved_fraction,
            usable_tokens: total_tokens.saturating_sub(reserved),
        }
    }
}

/// How much failure evidence there is to split the budget over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureCounts {
    pub steps: usize,
    pub tests: usize,
    pub artifacts_present: bool,
}

impl FailureCounts {
    /// Steps weigh double; all artifacts together weigh one.
    pub fn weighted_units(&self) -> u64 {
        2 * self.steps as u64 + self.tests as u64 + u64::from(self.artifacts_present)
    }
}

/// Per-category token budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudgets {
    /// Budget for a single step's log.
    pub step: u64,
    /// Budget for a single test's details.
    pub test: u64,
    /// Ceiling for one artifact batch request.
    pub artifact_batch: u64,
}

fn clamp(value: u64, (lo, hi): (u64, u64)) -> u64 {
    value.clamp(lo, hi)
}

/// Split the usable context window across failure categories.
pub fn allocate(counts: FailureCounts, budget: &ContextBudget) -> TokenBudgets {
    let units = counts.weighted_units();

    if units == 0 {
        let fraction = |f: f64| (budget.total_tokens as f64 * f) as u64;
        return TokenBudgets {
            step: clamp(fraction(EMPTY_STEP_FRACTION), STEP_BOUNDS),
            test: clamp(fraction(EMPTY_TEST_FRACTION), TEST_BOUNDS),
            artifact_batch: clamp(fraction(EMPTY_ARTIFACT_FRACTION), ARTIFACT_BATCH_BOUNDS),
        };
    }

    let per_unit = budget.usable_tokens / units;
    TokenBudgets {
        step: clamp(per_unit.saturating_mul(2), STEP_BOUNDS),
        test: clamp(per_unit, TEST_BOUNDS),
        artifact_batch: clamp(per_unit, ARTIFACT_BATCH_BOUNDS),
    }
}

/// Reduction target for each artifact before batching.
pub fn per_artifact_budget(artifact_batch: u64, artifact_count: usize) -> u64 {
    if artifact_count == 0 {
        return artifact_batch;
    }
    let content_share = (artifact_batch as f64 * ARTIFACT_CONTENT_SHARE) as u64;
    (content_share / artifact_count as u64).max(MIN_TOKENS_PER_ARTIFACT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(steps: usize, tests: usize, artifacts_present: bool) -> FailureCounts {
        FailureCounts {
            steps,
            tests,
            artifacts_present,
        }
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_context_budget_reserves_fraction() {
        let budget = ContextBudget::new(128_000, 0.15);
        assert_eq!(budget.usable_tokens, 108_800);
        assert_eq!(budget.total_tokens, 128_000);
    }

    #[test]
    fn test_allocate_two_steps_one_test() {
        let budget = ContextBudget::new(128_000, 0.15);
        let budgets = allocate(counts(2, 1, false), &budget);
        // 108_800 / 5 = 21_760 per unit
        assert_eq!(budgets.step, 43_520);
        assert_eq!(budgets.test, 21_760);
        assert_eq!(budgets.artifact_batch, 21_760);
    }

    #[test]
    fn test_allocate_clamps_to_upper_bounds() {
        let budget = ContextBudget::new(2_000_000, 0.15);
        let budgets = allocate(counts(1, 0, false), &budget);
        assert_eq!(budgets.step, STEP_BOUNDS.1);
        assert_eq!(budgets.test, TEST_BOUNDS.1);
        assert_eq!(budgets.artifact_batch, ARTIFACT_BATCH_BOUNDS.1);
    }

    #[test]
    fn test_allocate_clamps_to_lower_bounds() {
        let budget = ContextBudget::new(8_192, 0.15);
        let budgets = allocate(counts(10, 40, true), &budget);
        assert_eq!(budgets.step, STEP_BOUNDS.0);
        assert_eq!(budgets.test, TEST_BOUNDS.0);
        assert_eq!(budgets.artifact_batch, ARTIFACT_BATCH_BOUNDS.0);
    }

    #[test]
    fn test_allocate_empty_uses_fractions() {
        let budget = ContextBudget::new(1_000_000, 0.15);
        let budgets = allocate(counts(0, 0, false), &budget);
        assert_eq!(budgets.step, 200_000);
        assert_eq!(budgets.test, 80_000);
        assert_eq!(budgets.artifact_batch, 80_000);
    }

    #[test]
    fn test_artifacts_count_as_one_unit() {
        let budget = ContextBudget::new(128_000, 0.15);
        let with = allocate(counts(1, 0, true), &budget);
        // 108_800 / 3
        assert_eq!(with.artifact_batch, 36_266);
    }

    #[test]
    fn test_per_artifact_budget() {
        assert_eq!(per_artifact_budget(50_000, 4), 10_000);
        assert_eq!(per_artifact_budget(20_000, 100), 1_000);
        assert_eq!(per_artifact_budget(20_000, 0), 20_000);
    }
}
