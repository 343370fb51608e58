//! Dependency graph for cascading invalidation.
//!
//! Directed edges run from a key to the keys whose validity depends on it.
//! Edges are advisory: they drive cascade invalidation and imply no shared
//! ownership or TTL inheritance. Traversal is iterative with an explicit
//! visited set, so diamonds and cycles terminate and each reachable key is
//! yielded exactly once.

use std::collections::{HashSet, VecDeque};

use dashmap::DashMap;
use serde::Serialize;

/// Parent-to-children edge sets.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: DashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            edges: DashMap::new(),
        }
    }

    /// Insert an edge. Returns false if it was already present.
    pub fn add(&self, parent: &str, child: &str) -> bool {
        self.edges
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string())
    }

    /// Direct children of a key.
    pub fn children(&self, key: &str) -> Vec<String> {
        self.edges
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every key reachable from `root`, breadth-first, each exactly once.
    /// The root itself is not included.
    pub fn reachable(&self, root: &str) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(root.to_string());

        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(root.to_string());

        let mut order = Vec::new();
        while let Some(key) = queue.pop_front() {
            // Clone the edge set so no shard guard is held while traversing.
            for child in self.children(&key) {
                if visited.insert(child.clone()) {
                    order.push(child.clone());
                    queue.push_back(child);
                }
            }
        }
        order
    }

    /// Drop a key's outgoing edge set. Called when the key is invalidated so
    /// the graph does not accumulate edges for dead keys.
    pub fn remove_key(&self, key: &str) -> bool {
        self.edges.remove(key).is_some()
    }

    /// Number of keys with at least one outgoing edge.
    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(|set| set.len()).sum()
    }
}

/// A single failed target inside a cascade.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationFailure {
    pub key: String,
    pub error: String,
}

/// Outcome of a cascade invalidation.
///
/// A failure on one descendant never aborts its siblings; the cascade runs to
/// completion and reports what it could not invalidate.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationReport {
    /// The key whose dependents were invalidated.
    pub origin: String,
    /// Keys invalidated in both tiers, in traversal order.
    pub invalidated: Vec<String>,
    /// Keys whose store-side invalidation failed.
    pub failures: Vec<InvalidationFailure>,
}

impl InvalidationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
