//! Access-pattern tracking.
//!
//! Records per-key read/write counts and recency. The tracker is purely
//! advisory: it informs the cold-entry sweep and the analytics snapshot, and
//! never gates a get/set. Frequency is cumulative: total accesses divided by
//! seconds since the key was first seen.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Kind of access being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// Per-key access bookkeeping.
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub reads: u64,
    pub writes: u64,
    pub first_access: Instant,
    pub last_access: Instant,
}

impl AccessRecord {
    fn new(now: Instant) -> Self {
        Self {
            reads: 0,
            writes: 0,
            first_access: now,
            last_access: now,
        }
    }

    pub fn total(&self) -> u64 {
        self.reads + self.writes
    }

    /// Accesses per second since the key was first seen. Keys younger than a
    /// second are treated as a full second old so a single burst does not
    /// produce an unbounded rate.
    pub fn frequency(&self, now: Instant) -> f64 {
        let elapsed = now.duration_since(self.first_access).as_secs_f64().max(1.0);
        self.total() as f64 / elapsed
    }

    /// Time since the last recorded access.
    pub fn idle(&self, now: Instant) -> Duration {
        now.duration_since(self.last_access)
    }
}

/// Sharded map of access records.
#[derive(Debug, Default)]
pub struct AccessTracker {
    records: DashMap<String, AccessRecord>,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Record one access of the given kind.
    pub fn record(&self, key: &str, kind: AccessKind) {
        let now = Instant::now();
        let mut record = self
            .records
            .entry(key.to_string())
            .or_insert_with(|| AccessRecord::new(now));
        match kind {
            AccessKind::Read => record.reads += 1,
            AccessKind::Write => record.writes += 1,
        }
        record.last_access = now;
    }

    /// Snapshot the record for a key.
    pub fn get(&self, key: &str) -> Option<AccessRecord> {
        self.records.get(key).map(|r| r.clone())
    }

    /// Keys idle beyond `window` with frequency below `min_frequency`,
    /// the candidates for the cold-entry sweep.
    pub fn cold_keys(&self, window: Duration, min_frequency: f64) -> Vec<String> {
        let now = Instant::now();
        self.records
            .iter()
            .filter(|r| r.idle(now) >= window && r.frequency(now) < min_frequency)
            .map(|r| r.key().clone())
            .collect()
    }

    /// The `n` most-accessed keys, busiest first.
    pub fn top(&self, n: usize) -> Vec<(String, AccessRecord)> {
        let mut all: Vec<(String, AccessRecord)> = self
            .records
            .iter()
            .map(|r| (r.key().clone(), r.clone()))
            .collect();
        all.sort_by(|a, b| b.1.total().cmp(&a.1.total()));
        all.truncate(n);
        all
    }

    /// Drop a single record.
    pub fn forget(&self, key: &str) {
        self.records.remove(key);
    }

    /// Drop records untouched for longer than `window`. Returns how many were
    /// pruned.
    pub fn prune_stale(&self, window: Duration) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, r| r.idle(now) < window);
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts() {
        let tracker = AccessTracker::new();
        tracker.record("k", AccessKind::Read);
        tracker.record("k", AccessKind::Read);
        tracker.record("k", AccessKind::Write);

        let record = tracker.get("k").unwrap();
        assert_eq!(record.reads, 2);
        assert_eq!(record.writes, 1);
        assert_eq!(record.total(), 3);
    }

    #[test]
    fn test_frequency_is_bounded_for_young_keys() {
        let tracker = AccessTracker::new();
        for _ in 0..100 {
            tracker.record("k", AccessKind::Read);
        }
        let record = tracker.get("k").unwrap();
        // 100 accesses over a floor of one second.
        assert!(record.frequency(Instant::now()) <= 100.0);
    }

    #[test]
    fn test_top_orders_by_total_accesses() {
        let tracker = AccessTracker::new();
        for _ in 0..5 {
            tracker.record("busy", AccessKind::Read);
        }
        tracker.record("quiet", AccessKind::Read);

        let top = tracker.top(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, "busy");
    }

    #[test]
    fn test_cold_keys_need_both_conditions() {
        let tracker = AccessTracker::new();
        tracker.record("k", AccessKind::Read);

        // Idle requirement not met yet.
        assert!(tracker
            .cold_keys(Duration::from_secs(60), 1000.0)
            .is_empty());
        // Zero window: idle, and frequency below an impossible threshold.
        assert_eq!(tracker.cold_keys(Duration::ZERO, 1000.0), vec!["k"]);
        // Frequency threshold of zero can never be undercut.
        assert!(tracker.cold_keys(Duration::ZERO, 0.0).is_empty());
    }

    #[test]
    fn test_prune_stale() {
        let tracker = AccessTracker::new();
        tracker.record("k", AccessKind::Read);
        assert_eq!(tracker.prune_stale(Duration::from_secs(60)), 0);
        assert_eq!(tracker.prune_stale(Duration::ZERO), 1);
        assert!(tracker.is_empty());
    }
}
