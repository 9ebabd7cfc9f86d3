//! Active rule set holder
//!
//! Request tasks take a snapshot at the start of each query and keep it for
//! the whole request, so a reload in the middle never mixes two sets.

use super::types::CompiledRuleSet;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lock-free holder of the active [`CompiledRuleSet`]
#[derive(Debug)]
pub struct RuleStore {
    current: ArcSwap<CompiledRuleSet>,
    generation: AtomicU64,
}

impl RuleStore {
    /// Create a store holding `initial` as generation 1
    pub fn new(initial: CompiledRuleSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            generation: AtomicU64::new(1),
        }
    }

    /// Owned handle on the active set, valid for as long as it is held
    pub fn snapshot(&self) -> Arc<CompiledRuleSet> {
        self.current.load_full()
    }

    /// Atomically replace the active set and return the new generation
    pub fn replace(&self, next: CompiledRuleSet) -> u64 {
        self.current.store(Arc::new(next));
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of sets installed so far, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
