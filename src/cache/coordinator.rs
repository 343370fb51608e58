//! The tier coordinator: public cache API and lookup orchestration.
//!
//! The coordinator owns the lookup order (L1 → L2 → loader), populates tiers
//! backward on the way out, and absorbs every cache-internal failure so
//! callers only ever observe a value, an absence, or their own loader's
//! error. Concurrent `get_or_load` calls for the same key are coalesced into
//! a single in-flight load; the guard is scoped per key, so a miss on one key
//! never blocks another.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::{Future, FutureExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::codec::{CodecError, ValueCodec};
use crate::cache::deps::{DependencyGraph, InvalidationFailure, InvalidationReport};
use crate::cache::key::{KeyCodec, KeyError};
use crate::cache::local::LocalTier;
use crate::cache::stats::{CacheStats, KeyUsage, StatsSnapshot};
use crate::cache::sweeper::{SweepReport, Sweeper};
use crate::cache::tracker::{AccessKind, AccessTracker};
use crate::config::Config;
use crate::store::{RedisStore, RemoteStore, StoreError};

/// The only error type cache consumers see.
///
/// Store outages and undecodable payloads never appear here; they degrade to
/// misses internally. `Loader` carries the business layer's own error,
/// unchanged; it is shared behind an `Arc` so every coalesced caller of the
/// same flight observes the same failure.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache key rejected: {0}")]
    Key(#[from] KeyError),

    #[error("value rejected: {0}")]
    Serialization(#[from] CodecError),

    #[error("loader failed: {0}")]
    Loader(Arc<anyhow::Error>),
}

/// Outcome of a per-key flight, shared by every coalesced caller.
type FlightResult = Result<Value, Arc<anyhow::Error>>;
type FlightFuture = Shared<BoxFuture<'static, FlightResult>>;

/// A multi-tier read-through cache instance.
///
/// Cheaply cloneable handle over one shared core; construct one per backing
/// store and pass clones to request handlers.
#[derive(Clone)]
pub struct TieredCache {
    core: Arc<CacheCore>,
}

struct CacheCore {
    config: Config,
    keys: KeyCodec,
    codec: ValueCodec,
    local: Arc<LocalTier>,
    store: Arc<dyn RemoteStore>,
    tracker: Arc<AccessTracker>,
    graph: DependencyGraph,
    stats: Arc<CacheStats>,
    sweeper: Sweeper,
    in_flight: DashMap<String, FlightFuture>,
    sweeper_task: Mutex<Option<JoinHandle<()>>>,
}

impl TieredCache {
    /// Connect to the Redis backing store described by the configuration.
    pub async fn connect(config: Config) -> Result<Self, StoreError> {
        let store = RedisStore::connect(&config.store).await?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Build an instance over an injected store adapter.
    ///
    /// This is the seam for tests and single-node deployments: every instance
    /// is fully isolated: there is no ambient process-wide cache state.
    pub fn with_store(config: Config, store: Arc<dyn RemoteStore>) -> Self {
        let local = Arc::new(LocalTier::new());
        let tracker = Arc::new(AccessTracker::new());
        let stats = Arc::new(CacheStats::new());
        let sweeper = Sweeper::new(
            config.sweep.clone(),
            local.clone(),
            tracker.clone(),
            stats.clone(),
        );

        let core = CacheCore {
            keys: KeyCodec::new(config.app_prefix.clone()),
            codec: ValueCodec::new(config.codec.clone()),
            local,
            store,
            tracker,
            graph: DependencyGraph::new(),
            stats,
            sweeper,
            in_flight: DashMap::new(),
            sweeper_task: Mutex::new(None),
            config,
        };

        info!(app_prefix = %core.config.app_prefix, "Cache instance ready");
        Self { core: Arc::new(core) }
    }

    /// Build a canonical key for this instance's namespace.
    pub fn build_key<P, N>(&self, prefix: &str, positional: &P, named: &N) -> Result<String, CacheError>
    where
        P: Serialize,
        N: Serialize,
    {
        Ok(self.core.keys.build(prefix, positional, named)?)
    }

    pub fn key_codec(&self) -> &KeyCodec {
        &self.core.keys
    }

    /// Look up a key: L1, then the backing store, then absent.
    ///
    /// The signature has no error channel: a store outage or an undecodable
    /// payload degrades to `None` and is counted, never raised.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.core.local.get(key) {
            CacheStats::incr(&self.core.stats.l1_hits);
            self.core.tracker.record(key, AccessKind::Read);
            return Some(value);
        }
        CacheStats::incr(&self.core.stats.l1_misses);

        let value = self.core.fetch_remote(key).await?;
        self.core
            .local
            .set(key, value.clone(), self.core.config.default_ttl());
        self.core.tracker.record(key, AccessKind::Read);
        Some(value)
    }

    /// Store a value in both tiers.
    ///
    /// A value that cannot be encoded is rejected outright; a store outage is
    /// absorbed (L1 still carries the entry, bounded by its TTL).
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let encoded = self.core.codec.encode(&value)?;
        let ttl = self.core.config.resolve_ttl(ttl);

        if let Err(e) = self.core.store.set(key, encoded, ttl).await {
            self.core.note_store_failure("set", key, &e);
        }
        self.core.local.set(key, value, ttl);
        self.core.tracker.record(key, AccessKind::Write);
        Ok(())
    }

    /// Remove a key from both tiers. Returns whether either tier had it.
    pub async fn delete(&self, key: &str) -> bool {
        let local_removed = self.core.local.evict_key(key);
        let remote_removed = match self.core.store.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                self.core.note_store_failure("delete", key, &e);
                false
            }
        };

        let removed = local_removed || remote_removed;
        if removed {
            CacheStats::incr(&self.core.stats.invalidations);
        }
        removed
    }

    /// Remove every key matching a glob pattern from both tiers. Returns the
    /// number of distinct keys removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut removed: HashSet<String> =
            self.core.local.evict_matching(pattern).into_iter().collect();

        match self.core.store.scan(pattern).await {
            Ok(keys) => {
                for key in keys {
                    match self.core.store.delete(&key).await {
                        Ok(true) => {
                            removed.insert(key);
                        }
                        Ok(false) => {}
                        Err(e) => self.core.note_store_failure("delete", &key, &e),
                    }
                }
            }
            Err(e) => self.core.note_store_failure("scan", pattern, &e),
        }

        for key in &removed {
            self.core.graph.remove_key(key);
        }
        CacheStats::add(&self.core.stats.invalidations, removed.len() as u64);
        debug!(pattern = %pattern, removed = removed.len(), "Pattern invalidation complete");
        removed.len()
    }

    /// Read-through lookup: L1, then a per-key flight that re-checks the
    /// backing store and invokes the loader on a true miss.
    ///
    /// Concurrent callers for the same key share one flight: the loader runs
    /// at most once per miss, and every caller observes the same value or the
    /// same error. The flight runs as a detached task: a caller that gives up
    /// early does not abort the load for the others, and a loader that
    /// completes after its caller went away still populates both tiers.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<Value, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        if let Some(value) = self.core.local.get(key) {
            CacheStats::incr(&self.core.stats.l1_hits);
            self.core.tracker.record(key, AccessKind::Read);
            return Ok(value);
        }
        CacheStats::incr(&self.core.stats.l1_misses);

        match self.join_or_start_flight(key, ttl, loader).await {
            Ok(value) => {
                self.core.tracker.record(key, AccessKind::Read);
                Ok(value)
            }
            Err(e) => Err(CacheError::Loader(e)),
        }
    }

    /// Join the in-flight load for `key`, or start one if none exists.
    fn join_or_start_flight<F, Fut>(&self, key: &str, ttl: Option<Duration>, loader: F) -> FlightFuture
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let mut start: Option<tokio::sync::oneshot::Sender<FlightResult>> = None;

        let flight = match self.core.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                CacheStats::incr(&self.core.stats.coalesced_waits);
                entry.get().clone()
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = tokio::sync::oneshot::channel::<FlightResult>();
                let shared: FlightFuture = async move {
                    match rx.await {
                        Ok(result) => result,
                        Err(_) => Err(Arc::new(anyhow::anyhow!("cache flight aborted"))),
                    }
                }
                .boxed()
                .shared();
                slot.insert(shared.clone());
                start = Some(tx);
                shared
            }
        };

        // Spawn outside the map entry so no shard guard outlives this call.
        if let Some(tx) = start {
            let core = self.core.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                // A panicking loader must still release the flight slot.
                let result = std::panic::AssertUnwindSafe(core.run_flight(&key, ttl, loader))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(Arc::new(anyhow::anyhow!("loader panicked")))
                    });
                core.in_flight.remove(&key);
                let _ = tx.send(result);
            });
        }

        flight
    }

    /// Declare that `child`'s validity depends on `parent`.
    pub fn add_dependency(&self, parent: &str, child: &str) {
        if self.core.graph.add(parent, child) {
            debug!(parent = %parent, child = %child, "Dependency registered");
        }
    }

    /// Invalidate every key reachable from `key` in the dependency graph,
    /// each exactly once, in both tiers.
    ///
    /// Best-effort across branches: a descendant whose store-side delete
    /// fails is recorded and its siblings still run. The report is a result
    /// value, and a partial failure never aborts the call.
    pub async fn invalidate_dependencies(&self, key: &str) -> InvalidationReport {
        let targets = self.core.graph.reachable(key);
        let mut invalidated = Vec::with_capacity(targets.len());
        let mut failures = Vec::new();

        for target in targets {
            self.core.local.evict_key(&target);
            match self.core.store.delete(&target).await {
                Ok(_) => {
                    self.core.graph.remove_key(&target);
                    CacheStats::incr(&self.core.stats.invalidations);
                    invalidated.push(target);
                }
                Err(e) => {
                    self.core.note_store_failure("delete", &target, &e);
                    failures.push(InvalidationFailure {
                        key: target,
                        error: e.to_string(),
                    });
                }
            }
        }

        // Children re-register their edges when they are repopulated; the
        // origin keeps its edge set only while failed targets remain.
        if failures.is_empty() {
            self.core.graph.remove_key(key);
        }

        debug!(
            origin = %key,
            invalidated = invalidated.len(),
            failures = failures.len(),
            "Cascade invalidation complete"
        );
        InvalidationReport {
            origin: key.to_string(),
            invalidated,
            failures,
        }
    }

    /// Add `delta` to a shared counter in the backing store. `None` when the
    /// store is unavailable.
    pub async fn increment(&self, key: &str, delta: i64) -> Option<i64> {
        match self.core.store.incr(key, delta).await {
            Ok(value) => Some(value),
            Err(e) => {
                self.core.note_store_failure("incr", key, &e);
                None
            }
        }
    }

    /// Subtract `delta` from a shared counter in the backing store.
    pub async fn decrement(&self, key: &str, delta: i64) -> Option<i64> {
        match self.core.store.decr(key, delta).await {
            Ok(value) => Some(value),
            Err(e) => {
                self.core.note_store_failure("decr", key, &e);
                None
            }
        }
    }

    /// Publish the `top_n` busiest keys' access totals to the shared usage
    /// hash, so sibling processes can see each other's traffic. Returns how
    /// many entries were written.
    pub async fn publish_usage(&self, top_n: usize) -> usize {
        let hash_key = self.usage_hash_key();
        let mut published = 0;

        for (key, record) in self.core.tracker.top(top_n) {
            let payload = serde_json::json!({
                "reads": record.reads,
                "writes": record.writes,
            });
            let encoded = match self.core.codec.encode(&payload) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unencodable usage entry");
                    continue;
                }
            };
            match self.core.store.hash_set(&hash_key, &key, encoded).await {
                Ok(()) => published += 1,
                Err(e) => {
                    self.core.note_store_failure("hset", &hash_key, &e);
                    break;
                }
            }
        }
        published
    }

    /// Read the shared usage hash. Empty when the store is unavailable.
    pub async fn read_usage(&self) -> Vec<KeyUsage> {
        let hash_key = self.usage_hash_key();
        match self.core.store.hash_get_all(&hash_key).await {
            Ok(fields) => fields
                .into_iter()
                .filter_map(|(key, raw)| {
                    let value = self.core.codec.decode(&raw).ok()?;
                    Some(KeyUsage {
                        key,
                        reads: value.get("reads").and_then(Value::as_u64).unwrap_or(0),
                        writes: value.get("writes").and_then(Value::as_u64).unwrap_or(0),
                    })
                })
                .collect(),
            Err(e) => {
                self.core.note_store_failure("hgetall", &hash_key, &e);
                Vec::new()
            }
        }
    }

    /// Read one key's entry from the shared usage hash.
    pub async fn usage_for(&self, key: &str) -> Option<KeyUsage> {
        let hash_key = self.usage_hash_key();
        match self.core.store.hash_get(&hash_key, key).await {
            Ok(Some(raw)) => {
                let value = self.core.codec.decode(&raw).ok()?;
                Some(KeyUsage {
                    key: key.to_string(),
                    reads: value.get("reads").and_then(Value::as_u64).unwrap_or(0),
                    writes: value.get("writes").and_then(Value::as_u64).unwrap_or(0),
                })
            }
            Ok(None) => None,
            Err(e) => {
                self.core.note_store_failure("hget", &hash_key, &e);
                None
            }
        }
    }

    /// Drop one key's entry from the shared usage hash.
    pub async fn forget_usage(&self, key: &str) -> bool {
        let hash_key = self.usage_hash_key();
        match self.core.store.hash_delete(&hash_key, key).await {
            Ok(removed) => removed,
            Err(e) => {
                self.core.note_store_failure("hdel", &hash_key, &e);
                false
            }
        }
    }

    fn usage_hash_key(&self) -> String {
        format!("{}:stats:usage", self.core.keys.app_prefix())
    }

    /// Point-in-time analytics snapshot. Never mutates cache entries; access
    /// records untouched for several staleness windows are lazily pruned.
    pub fn snapshot(&self, top_n: usize) -> StatsSnapshot {
        self.core
            .tracker
            .prune_stale(self.core.config.staleness_window() * 4);

        let mut snap = StatsSnapshot::from_counters(&self.core.stats);
        snap.top_keys = self
            .core
            .tracker
            .top(top_n)
            .into_iter()
            .map(|(key, r)| KeyUsage {
                key,
                reads: r.reads,
                writes: r.writes,
            })
            .collect();
        snap.graph_nodes = self.core.graph.node_count();
        snap.graph_edges = self.core.graph.edge_count();
        snap.l1_entries = self.core.local.len();
        snap.tracked_keys = self.core.tracker.len();
        snap
    }

    /// Zero every counter.
    pub fn reset_stats(&self) {
        self.core.stats.reset();
    }

    /// Run one cold-entry sweep round now.
    pub fn run_sweep(&self) -> SweepReport {
        self.core.sweeper.run()
    }

    /// Run the sweep on an interval until [`TieredCache::shutdown`].
    pub fn spawn_sweeper(&self, every: Duration) {
        let core = self.core.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                core.sweeper.run();
            }
        });

        let mut slot = self.core.sweeper_task.lock().unwrap();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// Whether the backing store answered its most recent operation.
    pub fn store_connected(&self) -> bool {
        self.core.store.is_connected()
    }

    /// Stop the background sweeper and drop the in-process tier. The backing
    /// store connection closes when the last handle is dropped.
    pub fn shutdown(&self) {
        if let Some(handle) = self.core.sweeper_task.lock().unwrap().take() {
            handle.abort();
        }
        self.core.local.clear();
        info!("Cache instance shut down");
    }
}

impl CacheCore {
    /// Fetch and decode a key from the backing store. Any failure degrades to
    /// a miss; only genuine misses count toward the L2 miss rate.
    async fn fetch_remote(&self, key: &str) -> Option<Value> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match self.codec.decode(&raw) {
                Ok(value) => {
                    CacheStats::incr(&self.stats.l2_hits);
                    Some(value)
                }
                Err(e) => {
                    CacheStats::incr(&self.stats.decode_failures);
                    CacheStats::incr(&self.stats.l2_misses);
                    warn!(key = %key, error = %e, "Undecodable payload, treating as miss");
                    None
                }
            },
            Ok(None) => {
                CacheStats::incr(&self.stats.l2_misses);
                None
            }
            Err(e) => {
                self.note_store_failure("get", key, &e);
                None
            }
        }
    }

    /// Resolve one coalesced miss: re-check the backing store (another
    /// process may have filled it while this flight queued), then invoke the
    /// loader. On success both tiers are populated; on failure nothing is
    /// cached and the loader's error is handed to every waiting caller.
    async fn run_flight<F, Fut>(&self, key: &str, ttl: Option<Duration>, loader: F) -> FlightResult
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let ttl = self.config.resolve_ttl(ttl);

        if let Some(value) = self.fetch_remote(key).await {
            self.local.set(key, value.clone(), ttl);
            return Ok(value);
        }

        CacheStats::incr(&self.stats.loader_loads);
        match loader().await {
            Ok(value) => {
                match self.codec.encode(&value) {
                    Ok(encoded) => {
                        if let Err(e) = self.store.set(key, encoded, ttl).await {
                            self.note_store_failure("set", key, &e);
                        }
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Loaded value not encodable, L1 only");
                    }
                }
                self.local.set(key, value.clone(), ttl);
                self.tracker.record(key, AccessKind::Write);
                debug!(key = %key, "Loader resolved, tiers populated");
                Ok(value)
            }
            Err(e) => {
                CacheStats::incr(&self.stats.loader_errors);
                debug!(key = %key, error = %e, "Loader failed, nothing cached");
                Err(Arc::new(e))
            }
        }
    }

    fn note_store_failure(&self, op: &str, key: &str, e: &StoreError) {
        CacheStats::incr(&self.stats.store_unavailable);
        warn!(op, key = %key, error = %e, "Backing store unavailable, degrading");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn cache() -> TieredCache {
        TieredCache::with_store(Config::default(), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_set_then_get_hits_l1() {
        let cache = cache();
        cache
            .set("user:7", json!({"name": "Ana"}), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(cache.get("user:7").await, Some(json!({"name": "Ana"})));

        let snap = cache.snapshot(5);
        assert_eq!(snap.l1_hits, 1);
    }

    #[tokio::test]
    async fn test_get_or_load_populates_both_tiers() {
        let cache = cache();
        let value = cache
            .get_or_load("k", None, || async { Ok(json!(41 + 1)) })
            .await
            .unwrap();
        assert_eq!(value, json!(42));

        // Second call is an L1 hit; loader not consulted.
        let value = cache
            .get_or_load("k", None, || async { panic!("loader must not run") })
            .await
            .unwrap();
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn test_loader_error_propagates_and_caches_nothing() {
        let cache = cache();
        let err = cache
            .get_or_load("k", None, || async { anyhow::bail!("upstream gone") })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Loader(_)));
        assert!(err.to_string().contains("upstream gone"));
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_delete_removes_both_tiers() {
        let cache = cache();
        cache.set("k", json!(1), None).await.unwrap();
        assert!(cache.delete("k").await);
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.delete("k").await);
    }

    #[tokio::test]
    async fn test_build_key_roundtrip() {
        let cache = cache();
        let key = cache
            .build_key("project", &json!([42]), &json!({"view": "summary"}))
            .unwrap();
        cache.set(&key, json!({"id": 42}), None).await.unwrap();
        assert_eq!(cache.get(&key).await, Some(json!({"id": 42})));
    }
}
