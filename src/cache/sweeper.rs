//! Cold-entry sweep over access-tracker data.
//!
//! The sweep purges L1 entries that are both idle beyond the staleness window
//! and below the frequency threshold. It touches L1 only; the backing store
//! keeps its copy, so a swept key is a latency cost, never a correctness one.
//! Window and threshold come from [`SweepConfig`], supplied by the operator.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::local::LocalTier;
use crate::cache::stats::CacheStats;
use crate::cache::tracker::AccessTracker;
use crate::config::SweepConfig;

/// Outcome of one sweep round.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Tracked keys examined.
    pub examined: usize,
    /// Entries purged from the in-process tier.
    pub evicted: usize,
}

/// The sweep engine.
pub struct Sweeper {
    config: SweepConfig,
    local: Arc<LocalTier>,
    tracker: Arc<AccessTracker>,
    stats: Arc<CacheStats>,
}

impl Sweeper {
    pub fn new(
        config: SweepConfig,
        local: Arc<LocalTier>,
        tracker: Arc<AccessTracker>,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            config,
            local,
            tracker,
            stats,
        }
    }

    /// Run one sweep round.
    pub fn run(&self) -> SweepReport {
        let examined = self.tracker.len();
        let window = Duration::from_secs(self.config.staleness_secs);
        let cold = self.tracker.cold_keys(window, self.config.min_frequency);

        let mut evicted = 0;
        for key in &cold {
            if self.local.evict_key(key) {
                evicted += 1;
                CacheStats::incr(&self.stats.evictions);
            }
            // The record goes either way; a key that comes back starts fresh.
            self.tracker.forget(key);
        }

        if evicted > 0 {
            debug!(evicted, examined, "Sweep round complete");
        }

        SweepReport { examined, evicted }
    }
}
