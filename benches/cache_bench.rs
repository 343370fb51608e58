//! Benchmarks for the cache subsystem.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use lattice_cache::cache::deps::DependencyGraph;
use lattice_cache::cache::key::KeyCodec;
use lattice_cache::cache::local::LocalTier;

fn bench_key_build(c: &mut Criterion) {
    let codec = KeyCodec::new("app");
    let positional = json!([42, "detail", true]);
    let named = json!({"lang": "en", "page": 3, "sort": "updated_at"});

    c.bench_function("key_build_canonical", |b| {
        b.iter(|| {
            let key = codec
                .build(black_box("project"), black_box(&positional), black_box(&named))
                .unwrap();
            black_box(key);
        })
    });
}

fn bench_l1_hot_path(c: &mut Criterion) {
    let tier = LocalTier::new();
    for i in 0..10_000 {
        tier.set(
            &format!("key:{i}"),
            json!({"id": i}),
            Duration::from_secs(3600),
        );
    }

    c.bench_function("l1_get_hit_10k", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            i += 1;
            black_box(tier.get(&key));
        })
    });
}

fn bench_cascade_traversal(c: &mut Criterion) {
    // A 10,000-node graph with cross edges (diamonds at every level).
    let graph = DependencyGraph::new();
    for i in 0..10_000u32 {
        graph.add(&format!("n:{}", i / 10), &format!("n:{i}"));
        if i % 7 == 0 {
            graph.add(&format!("n:{}", i / 100), &format!("n:{i}"));
        }
    }

    c.bench_function("cascade_reachable_10k", |b| {
        b.iter(|| {
            let order = graph.reachable(black_box("n:0"));
            black_box(order);
        })
    });
}

criterion_group!(
    benches,
    bench_key_build,
    bench_l1_hot_path,
    bench_cascade_traversal,
);
criterion_main!(benches);
