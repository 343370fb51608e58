//! Backing store (L2) adapters.
//!
//! The shared tier speaks a minimal key-value protocol: GET / SET-with-TTL /
//! DEL / EXISTS / SCAN / INCR / DECR plus hash-map operations for structured
//! aggregates. Values cross this boundary as encoded bytes; the coordinator
//! owns the codec. Every adapter degrades: an unreachable or timed-out store
//! yields [`StoreError`], which the coordinator absorbs as a miss or no-op.
//! The backing store is never a single point of failure.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("backing store unreachable: {0}")]
    Unavailable(String),

    #[error("backing store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Abstraction over the shared external key-value tier.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the encoded value for a key.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Store an encoded value with a TTL (whole seconds, minimum one).
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Whether a key currently exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Every key matching a glob pattern. Cursor-based on real backends so a
    /// large keyspace never blocks unrelated operations.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Add `delta` to an integer key, creating it at zero first.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Subtract `delta` from an integer key, creating it at zero first.
    async fn decr(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Set one field of a hash.
    async fn hash_set(&self, key: &str, field: &str, value: Bytes) -> Result<(), StoreError>;

    /// Fetch one field of a hash.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Bytes>, StoreError>;

    /// Fetch all fields of a hash.
    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, Bytes)>, StoreError>;

    /// Remove one field of a hash. Returns whether it existed.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    /// Whether the last operation found the store reachable.
    fn is_connected(&self) -> bool;
}
