//! Process-wide cache counters and the read-only analytics snapshot.
//!
//! Counters are monotonically increasing within a run and explicitly
//! resettable. Taking a snapshot never mutates cache state beyond lazily
//! pruning stale access records.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Raw event counters, updated on every cache operation.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub l1_hits: AtomicU64,
    pub l1_misses: AtomicU64,
    pub l2_hits: AtomicU64,
    pub l2_misses: AtomicU64,
    pub loader_loads: AtomicU64,
    pub loader_errors: AtomicU64,
    pub coalesced_waits: AtomicU64,
    pub invalidations: AtomicU64,
    pub evictions: AtomicU64,
    pub store_unavailable: AtomicU64,
    pub decode_failures: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.l1_hits,
            &self.l1_misses,
            &self.l2_hits,
            &self.l2_misses,
            &self.loader_loads,
            &self.loader_errors,
            &self.coalesced_waits,
            &self.invalidations,
            &self.evictions,
            &self.store_unavailable,
            &self.decode_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Access totals for one of the busiest keys.
#[derive(Debug, Clone, Serialize)]
pub struct KeyUsage {
    pub key: String,
    pub reads: u64,
    pub writes: u64,
}

/// Point-in-time view of the cache, safe to serialize and ship to dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub loader_loads: u64,
    pub loader_errors: u64,
    pub coalesced_waits: u64,
    pub invalidations: u64,
    pub evictions: u64,
    pub store_unavailable: u64,
    pub decode_failures: u64,

    /// L1 hits over L1 lookups.
    pub l1_hit_rate: f64,
    /// L2 hits over L2 lookups.
    pub l2_hit_rate: f64,
    /// Hits in either tier over all lookups that reached the cache.
    pub overall_hit_rate: f64,

    pub top_keys: Vec<KeyUsage>,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    pub l1_entries: usize,
    pub tracked_keys: usize,
}

impl StatsSnapshot {
    pub(crate) fn from_counters(stats: &CacheStats) -> Self {
        let l1_hits = stats.l1_hits.load(Ordering::Relaxed);
        let l1_misses = stats.l1_misses.load(Ordering::Relaxed);
        let l2_hits = stats.l2_hits.load(Ordering::Relaxed);
        let l2_misses = stats.l2_misses.load(Ordering::Relaxed);

        Self {
            l1_hits,
            l1_misses,
            l2_hits,
            l2_misses,
            loader_loads: stats.loader_loads.load(Ordering::Relaxed),
            loader_errors: stats.loader_errors.load(Ordering::Relaxed),
            coalesced_waits: stats.coalesced_waits.load(Ordering::Relaxed),
            invalidations: stats.invalidations.load(Ordering::Relaxed),
            evictions: stats.evictions.load(Ordering::Relaxed),
            store_unavailable: stats.store_unavailable.load(Ordering::Relaxed),
            decode_failures: stats.decode_failures.load(Ordering::Relaxed),
            l1_hit_rate: rate(l1_hits, l1_hits + l1_misses),
            l2_hit_rate: rate(l2_hits, l2_hits + l2_misses),
            overall_hit_rate: rate(l1_hits + l2_hits, l1_hits + l1_misses),
            top_keys: Vec::new(),
            graph_nodes: 0,
            graph_edges: 0,
            l1_entries: 0,
            tracked_keys: 0,
        }
    }
}

fn rate(hits: u64, lookups: u64) -> f64 {
    if lookups == 0 {
        0.0
    } else {
        hits as f64 / lookups as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rates() {
        let stats = CacheStats::new();
        CacheStats::add(&stats.l1_hits, 3);
        CacheStats::add(&stats.l1_misses, 1);
        CacheStats::add(&stats.l2_hits, 1);

        let snap = StatsSnapshot::from_counters(&stats);
        assert!((snap.l1_hit_rate - 0.75).abs() < 1e-9);
        assert!((snap.l2_hit_rate - 1.0).abs() < 1e-9);
        assert!((snap.overall_hit_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_rates_are_zero() {
        let stats = CacheStats::new();
        let snap = StatsSnapshot::from_counters(&stats);
        assert_eq!(snap.l1_hit_rate, 0.0);
        assert_eq!(snap.overall_hit_rate, 0.0);
    }

    #[test]
    fn test_reset() {
        let stats = CacheStats::new();
        CacheStats::incr(&stats.l1_hits);
        CacheStats::incr(&stats.evictions);
        stats.reset();

        let snap = StatsSnapshot::from_counters(&stats);
        assert_eq!(snap.l1_hits, 0);
        assert_eq!(snap.evictions, 0);
    }
}
