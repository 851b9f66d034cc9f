use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Per-session count of how often each clip has been picked.
///
/// One tracker per session; share it behind an `Arc`. Counts only grow,
/// except through `reset_all`.
#[derive(Debug, Default)]
pub struct UsageTracker {
    counts: Mutex<HashMap<String, u32>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new count.
    pub fn increment(&self, key: &str) -> u32 {
        bump(&mut self.lock(), key)
    }

    pub fn get(&self, key: &str) -> u32 {
        self.lock().get(key).copied().unwrap_or(0)
    }

    pub fn reset_all(&self) {
        let mut counts = self.lock();
        tracing::info!("Resetting usage counts for {} clips", counts.len());
        counts.clear();
    }

    pub fn snapshot(&self) -> HashMap<String, u32> {
        self.lock().clone()
    }

    /// Holding the guard keeps other selections in this session out, so a
    /// score computed from these counts stays valid until the increment.
    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        // A panic elsewhere cannot leave the map half-written.
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn bump(counts: &mut HashMap<String, u32>, key: &str) -> u32 {
    let count = counts.entry(key.to_string()).or_insert(0);
    *count = count.saturating_add(1);
    *count
}
