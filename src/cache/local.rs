//! In-process cache tier (L1).
//!
//! A sharded concurrent map of decoded values with per-entry expiry. L1 is a
//! strict accelerator over the backing store: it is never authoritative, and
//! dropping it entirely only costs latency. Expiry is lazy: an entry that has
//! outlived its TTL is purged at read time.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use crate::cache::key::pattern_matches;

/// A single L1 entry. Always derivable from the backing store.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// The in-process tier.
#[derive(Debug, Default)]
pub struct LocalTier {
    entries: DashMap<String, CacheEntry>,
}

impl LocalTier {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Look up a key, purging it if expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        // The shard guard must be released before removal.
        self.entries.remove_if(key, |_, entry| entry.is_expired(Instant::now()));
        None
    }

    /// Insert or refresh an entry with a resolved (positive) TTL.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
    }

    /// Remove a single key. Returns whether an entry was present.
    pub fn evict_key(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key matching a glob pattern, returning the removed keys.
    pub fn evict_matching(&self, pattern: &str) -> Vec<String> {
        let matched: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| pattern_matches(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for key in &matched {
            self.entries.remove(key);
        }
        matched
    }

    /// Current number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
