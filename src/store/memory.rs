//! In-process implementation of [`RemoteStore`].
//!
//! Backs single-node deployments and the test suite: honors TTLs, glob scans,
//! counters, and hashes with the same observable semantics as the Redis
//! adapter, and can simulate an outage via [`MemoryStore::set_offline`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::key::pattern_matches;
use crate::store::{RemoteStore, StoreError};

#[derive(Debug, Clone)]
struct StoredValue {
    data: Bytes,
    expires_at: Instant,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Hash-map backed store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, StoredValue>>,
    counters: Mutex<HashMap<String, i64>>,
    hashes: Mutex<HashMap<String, HashMap<String, Bytes>>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going down (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.check_online()?;
        let now = Instant::now();
        let mut values = self.values.lock().unwrap();
        match values.get(key) {
            Some(v) if !v.is_expired(now) => Ok(Some(v.data.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        self.check_online()?;
        let stored = StoredValue {
            data: value,
            expires_at: Instant::now() + ttl,
        };
        self.values.lock().unwrap().insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        Ok(self.values.lock().unwrap().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check_online()?;
        let now = Instant::now();
        let values = self.values.lock().unwrap();
        Ok(values
            .iter()
            .filter(|(k, v)| !v.is_expired(now) && pattern_matches(pattern, k))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.check_online()?;
        let mut counters = self.counters.lock().unwrap();
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += delta;
        Ok(*value)
    }

    async fn decr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.incr(key, -delta).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: Bytes) -> Result<(), StoreError> {
        self.check_online()?;
        self.hashes
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Bytes>, StoreError> {
        self.check_online()?;
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, Bytes)>, StoreError> {
        self.check_online()?;
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .get(key)
            .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .get_mut(key)
            .map(|h| h.remove(field).is_some())
            .unwrap_or(false))
    }

    fn is_connected(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}
