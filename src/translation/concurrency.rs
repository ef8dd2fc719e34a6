/*!
 * Size-tiered concurrency control.
 *
 * Batches are classified by the largest paragraph they contain: many small
 * requests can run in parallel cheaply, while batches holding very long
 * paragraphs get fewer workers and longer pacing delays. Each tier owns a
 * fair semaphore sized to its worker limit, and a worker holds its permit
 * through the pacing delay so the delay actually throttles the tier.
 */

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One concurrency tier: batches up to `max_words` share `workers` slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Largest contained-paragraph word count this tier accepts
    pub max_words: usize,
    /// Number of concurrent workers for this tier
    pub workers: usize,
    /// Pacing delay held after each request, in milliseconds
    pub delay_ms: u64,
}

/// Ordered tier table, consulted smallest threshold first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    tiers: Vec<TierPolicy>,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiers: vec![
                TierPolicy { max_words: 50, workers: 8, delay_ms: 100 },
                TierPolicy { max_words: 200, workers: 4, delay_ms: 250 },
                TierPolicy { max_words: 500, workers: 2, delay_ms: 500 },
                TierPolicy { max_words: usize::MAX, workers: 1, delay_ms: 1000 },
            ],
        }
    }
}

impl TierTable {
    /// Build a table from explicit tiers. Thresholds must be strictly
    /// ascending and the last tier must catch everything.
    pub fn new(tiers: Vec<TierPolicy>) -> Result<Self> {
        if tiers.is_empty() {
            bail!("Tier table must have at least one tier");
        }
        for pair in tiers.windows(2) {
            if pair[0].max_words >= pair[1].max_words {
                bail!("Tier thresholds must be strictly ascending");
            }
        }
        for tier in &tiers {
            if tier.workers == 0 {
                bail!("Tier worker count must be at least 1");
            }
        }
        if tiers[tiers.len() - 1].max_words != usize::MAX {
            bail!("Last tier must accept any word count");
        }
        Ok(Self { tiers })
    }

    /// Re-run the construction checks, for tables built by deserialization
    pub fn validate(&self) -> Result<()> {
        Self::new(self.tiers.clone()).map(|_| ())
    }

    /// Index of the first tier whose threshold covers `max_word_count`
    pub fn classify(&self, max_word_count: usize) -> usize {
        self.tiers
            .iter()
            .position(|tier| max_word_count <= tier.max_words)
            .unwrap_or(self.tiers.len() - 1)
    }

    /// Policy for a tier index
    pub fn policy(&self, tier: usize) -> &TierPolicy {
        &self.tiers[tier.min(self.tiers.len() - 1)]
    }

    /// Sum of all tier worker limits, the global in-flight ceiling
    pub fn total_workers(&self) -> usize {
        self.tiers.iter().map(|tier| tier.workers).sum()
    }
}

/// Runtime counterpart of a tier table: one fair semaphore per tier
#[derive(Debug, Clone)]
pub struct TierLimiter {
    table: TierTable,
    semaphores: Vec<Arc<Semaphore>>,
}

impl TierLimiter {
    /// Create semaphores sized to each tier's worker limit
    pub fn new(table: TierTable) -> Self {
        let semaphores = table
            .tiers
            .iter()
            .map(|tier| Arc::new(Semaphore::new(tier.workers)))
            .collect();
        Self { table, semaphores }
    }

    /// The underlying tier table
    pub fn table(&self) -> &TierTable {
        &self.table
    }

    /// Acquire a worker slot for the given tier
    pub async fn acquire(&self, tier: usize) -> OwnedSemaphorePermit {
        let index = tier.min(self.semaphores.len() - 1);
        // Semaphores are never closed, so acquisition cannot fail
        match self.semaphores[index].clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("tier semaphore closed"),
        }
    }

    /// Pacing delay for the given tier
    pub fn delay(&self, tier: usize) -> Duration {
        Duration::from_millis(self.table.policy(tier).delay_ms)
    }
}
