//! End-to-end tests: coalesced loads, cascade invalidation, store outages,
//! and the analytics surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use lattice_cache::store::MemoryStore;
use lattice_cache::{CacheError, Config, TieredCache};

fn cache_over(store: Arc<MemoryStore>) -> TieredCache {
    TieredCache::with_store(Config::default(), store)
}

#[tokio::test]
async fn test_concurrent_misses_invoke_loader_once() {
    let cache = cache_over(Arc::new(MemoryStore::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_load("expensive", None, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(json!({"result": 1337}))
                })
                .await
        }));
    }

    for handle in handles {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value, json!({"result": 1337}));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let snap = cache.snapshot(5);
    assert_eq!(snap.loader_loads, 1);
    assert_eq!(snap.coalesced_waits, 15);
}

#[tokio::test]
async fn test_coalesced_callers_share_the_same_error() {
    let cache = cache_over(Arc::new(MemoryStore::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_load("doomed", None, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    anyhow::bail!("source exploded")
                })
                .await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CacheError::Loader(_)));
        assert!(err.to_string().contains("source exploded"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Nothing was cached on the failure path.
    assert_eq!(cache.get("doomed").await, None);
}

#[tokio::test]
async fn test_miss_on_one_key_never_blocks_another() {
    let cache = cache_over(Arc::new(MemoryStore::new()));

    // A slow load on key A in flight...
    let slow = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_load("slow", None, || async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(json!("slow"))
                })
                .await
        })
    };

    // ...does not delay a load on key B.
    let started = std::time::Instant::now();
    let fast = cache
        .get_or_load("fast", None, || async { Ok(json!("fast")) })
        .await
        .unwrap();
    assert_eq!(fast, json!("fast"));
    assert!(started.elapsed() < Duration::from_millis(100));

    assert_eq!(slow.await.unwrap().unwrap(), json!("slow"));
}

#[tokio::test]
async fn test_diamond_cascade_invalidates_each_key_once() {
    let cache = cache_over(Arc::new(MemoryStore::new()));

    for key in ["a", "b", "c", "d"] {
        cache.set(key, json!({"node": key}), None).await.unwrap();
    }
    cache.add_dependency("a", "b");
    cache.add_dependency("a", "c");
    cache.add_dependency("b", "d");
    cache.add_dependency("c", "d");
    // A cycle back to the origin must not loop.
    cache.add_dependency("d", "a");

    let report = cache.invalidate_dependencies("a").await;
    assert!(report.is_complete());

    let mut invalidated = report.invalidated.clone();
    invalidated.sort();
    assert_eq!(invalidated, vec!["b", "c", "d"]);

    for key in ["b", "c", "d"] {
        assert_eq!(cache.get(key).await, None);
    }
    // The shared descendant is counted once, not twice.
    assert_eq!(cache.snapshot(5).invalidations, 3);
}

#[tokio::test]
async fn test_dependency_scenario_both_tiers() {
    use lattice_cache::store::RemoteStore;

    let store = Arc::new(MemoryStore::new());
    let cache = cache_over(store.clone());

    cache
        .set("project:99:user:7", json!({"role": "admin"}), None)
        .await
        .unwrap();
    cache.add_dependency("projects:user:7", "project:99:user:7");

    let report = cache.invalidate_dependencies("projects:user:7").await;
    assert_eq!(report.invalidated, vec!["project:99:user:7"]);

    // Gone from L1 (via the public API) and from the backing store directly.
    assert_eq!(cache.get("project:99:user:7").await, None);
    assert_eq!(store.get("project:99:user:7").await.unwrap(), None);
}

#[tokio::test]
async fn test_partial_cascade_failure_reports_and_continues() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache_over(store.clone());

    cache.set("parent", json!(0), None).await.unwrap();
    cache.set("child:1", json!(1), None).await.unwrap();
    cache.set("child:2", json!(2), None).await.unwrap();
    cache.add_dependency("parent", "child:1");
    cache.add_dependency("parent", "child:2");

    store.set_offline(true);
    let report = cache.invalidate_dependencies("parent").await;

    // Every branch was attempted; none aborted its siblings.
    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 2);
    assert!(report.invalidated.is_empty());

    // L1 eviction still happened: reads now fall through to the (offline)
    // store and degrade to absent.
    assert_eq!(cache.get("child:1").await, None);

    store.set_offline(false);
    let report = cache.invalidate_dependencies("parent").await;
    assert!(report.is_complete());
    assert_eq!(report.failures.len(), 0);
}

#[tokio::test]
async fn test_offline_store_degrades_to_miss() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache_over(store.clone());

    store.set_offline(true);

    // Reads degrade to absent, writes to L1-only; nothing raises.
    assert_eq!(cache.get("k").await, None);
    cache.set("k", json!(1), None).await.unwrap();
    assert_eq!(cache.get("k").await, Some(json!(1)));

    let snap = cache.snapshot(5);
    assert!(snap.store_unavailable >= 2);
    assert!(!cache.store_connected());

    store.set_offline(false);
    cache.set("k2", json!(2), None).await.unwrap();
    assert!(cache.store_connected());
}

#[tokio::test]
async fn test_snapshot_reports_rates_and_top_keys() {
    let cache = cache_over(Arc::new(MemoryStore::new()));

    cache.set("busy", json!(1), None).await.unwrap();
    for _ in 0..9 {
        assert!(cache.get("busy").await.is_some());
    }
    cache.set("quiet", json!(2), None).await.unwrap();
    assert_eq!(cache.get("missing").await, None);

    cache.add_dependency("busy", "quiet");

    let snap = cache.snapshot(1);
    assert_eq!(snap.l1_hits, 9);
    assert_eq!(snap.l1_misses, 1);
    assert!((snap.l1_hit_rate - 0.9).abs() < 1e-9);
    assert_eq!(snap.top_keys.len(), 1);
    assert_eq!(snap.top_keys[0].key, "busy");
    assert_eq!(snap.graph_nodes, 1);
    assert_eq!(snap.graph_edges, 1);
    assert_eq!(snap.l1_entries, 2);

    cache.reset_stats();
    assert_eq!(cache.snapshot(1).l1_hits, 0);
}

#[tokio::test]
async fn test_shared_counters_and_usage_hash() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache_over(store.clone());

    assert_eq!(cache.increment("jobs:active", 3).await, Some(3));
    assert_eq!(cache.decrement("jobs:active", 1).await, Some(2));

    cache.set("hot:key", json!(1), None).await.unwrap();
    for _ in 0..4 {
        assert!(cache.get("hot:key").await.is_some());
    }

    assert_eq!(cache.publish_usage(10).await, 1);

    let usage = cache.read_usage().await;
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].key, "hot:key");
    assert_eq!(usage[0].reads, 4);
    assert_eq!(usage[0].writes, 1);

    let single = cache.usage_for("hot:key").await.unwrap();
    assert_eq!(single.reads, 4);

    assert!(cache.forget_usage("hot:key").await);
    assert!(cache.read_usage().await.is_empty());

    // Offline store: the analytics surface degrades instead of failing.
    store.set_offline(true);
    assert_eq!(cache.increment("jobs:active", 1).await, None);
    assert!(cache.read_usage().await.is_empty());
    assert_eq!(cache.publish_usage(10).await, 0);
}
