/*!
 * Translation engine: batching, tiered concurrency, memory-first lookup and
 * the book-level orchestration loop.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod concurrency;
pub mod core;
pub mod orchestrator;

pub use concurrency::{TierLimiter, TierPolicy, TierTable};
pub use core::{TranslationMetrics, TranslationOptions, TranslationService, UnitMetrics};
pub use orchestrator::BookTranslator;

/// Cooperative cancellation flag shared between the controller and workers.
///
/// Workers check it before starting new oracle calls; in-flight calls finish
/// or fail on their own. Cancellation is one-way.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a new, unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_should_be_shared_across_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());

        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
