//! Greedy, order-preserving packing of artifacts into request-sized batches.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::budget::estimate_tokens;
use crate::domain::{ArtifactItem, Batch};

/// Packing constants. The multiplier and overheads are empirical; they
/// decide how close batches run to the service's real limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatcherConfig {
    /// Fixed cost of the request scaffolding around a batch.
    pub batch_overhead_tokens: u64,
    /// Fixed cost of the JSON framing around each item.
    pub item_overhead_tokens: u64,
    /// Inflation applied to every item estimate.
    pub safety_multiplier: f64,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_overhead_tokens: 500,
            item_overhead_tokens: 50,
            safety_multiplier: 1.2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactBatcher {
    config: BatcherConfig,
}

impl ArtifactBatcher {
    pub fn new(config: BatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    /// Estimated cost of one item, safety multiplier included.
    pub fn item_cost(&self, item: &ArtifactItem) -> u64 {
        let raw = estimate_tokens(&item.path)
            + estimate_tokens(&item.content)
            + self.config.item_overhead_tokens;
        (raw as f64 * self.config.safety_multiplier).ceil() as u64
    }

    /// Pack `items` into batches whose cost stays within `ceiling`.
    ///
    /// An item that does not fit even in an empty batch is emitted as an
    /// oversize singleton. Item order is never changed.
    pub fn pack(&self, items: Vec<ArtifactItem>, ceiling: u64) -> Vec<Batch> {
        let overhead = self.config.batch_overhead_tokens;
        let mut batches = Vec::new();
        let mut current: Vec<ArtifactItem> = Vec::new();
        let mut current_cost = overhead;

        for item in items {
            let cost = self.item_cost(&item);

            // Cannot fit even in an empty batch.
            if overhead + cost > ceiling {
                if !current.is_empty() {
                    batches.push(Batch {
                        items: std::mem::take(&mut current),
                        estimated_tokens: current_cost,
                        oversize: false,
                    });
                    current_cost = overhead;
                }
                debug!(path = %item.path, cost, ceiling, "artifact exceeds batch ceiling, sending alone");
                batches.push(Batch {
                    items: vec![item],
                    estimated_tokens: overhead + cost,
                    oversize: true,
                });
                continue;
            }

            if current_cost + cost > ceiling && !current.is_empty() {
                batches.push(Batch {
                    items: std::mem::take(&mut current),
                    estimated_tokens: current_cost,
                    oversize: false,
                });
                current_cost = overhead;
            }

            current.push(item);
            current_cost += cost;
        }

        if !current.is_empty() {
            batches.push(Batch {
                items: current,
                estimated_tokens: current_cost,
                oversize: false,
            });
        }

        batches
    }
}
