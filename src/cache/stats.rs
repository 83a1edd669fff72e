//! Cache Statistics Module
//!
//! Tracks per-shard operation counters: hits, misses, writes and evictions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Operation counters, safe to update from concurrent callers.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    creates: AtomicU64,
    create_conflicts: AtomicU64,
    removals: AtomicU64,
    evictions: AtomicU64,
    cycled: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Reads that returned a live value
    pub hits: u64,
    /// Reads of absent or expired keys
    pub misses: u64,
    pub sets: u64,
    pub creates: u64,
    /// Create-if-absent calls that found an existing key
    pub create_conflicts: u64,
    pub removals: u64,
    /// Expired items removed by the eviction loop
    pub evictions: u64,
    /// Live items given a second chance by the eviction loop
    pub cycled: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_create(&self) {
        self.creates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_create_conflict(&self) {
        self.create_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_cycled(&self, count: u64) {
        self.cycled.fetch_add(count, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Copies the counters and derives the hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn snapshot(&self) -> StatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        StatsSnapshot {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            creates: self.creates.load(Ordering::Relaxed),
            create_conflicts: self.create_conflicts.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            cycled: self.cycled.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}
