//! Progress accounting across parallel workers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Additive scene counter shared by all chunk workers.
///
/// Only `fetch_add` is used, so increments commute and any interleaving
/// yields the same final count.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter {
    processed: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl ProgressCounter {
    pub fn new(total: u64) -> Self {
        let counter = Self::default();
        counter.total.store(total, Ordering::Relaxed);
        counter
    }

    /// Add `n` processed scenes; returns the new count
    pub fn add(&self, n: u64) -> u64 {
        self.processed.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Reset both counters before a new run
    pub fn reset(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
    }
}
