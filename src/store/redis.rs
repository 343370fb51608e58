//! Redis implementation of [`RemoteStore`].
//!
//! Every operation is wrapped in an explicit timeout; a timeout or transport
//! error marks the adapter disconnected and surfaces as [`StoreError`] for the
//! coordinator to absorb. The connection manager reconnects on its own, and
//! the first operation that succeeds marks the adapter connected again.
//! Pattern scans use cursor iteration (SCAN, never KEYS) so a large keyspace
//! cannot block unrelated operations.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::store::{RemoteStore, StoreError};

/// Adapter over a shared Redis instance.
pub struct RedisStore {
    manager: ConnectionManager,
    op_timeout: Duration,
    scan_batch: usize,
    connected: AtomicBool,
}

impl RedisStore {
    /// Connect to the store described by `config`.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let op_timeout = Duration::from_millis(config.op_timeout_ms);
        let manager = tokio::time::timeout(op_timeout, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Timeout(op_timeout))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        debug!(url = %config.url, "Connected to backing store");

        Ok(Self {
            manager,
            op_timeout,
            scan_batch: config.scan_batch,
            connected: AtomicBool::new(true),
        })
    }

    /// Run one store operation under the configured timeout, tracking
    /// connectivity from the outcome.
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(value)) => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.connected.store(false, Ordering::Relaxed);
                warn!(error = %e, "Backing store operation failed");
                Err(StoreError::Unavailable(e.to_string()))
            }
            Err(_) => {
                self.connected.store(false, Ordering::Relaxed);
                warn!(timeout = ?self.op_timeout, "Backing store operation timed out");
                Err(StoreError::Timeout(self.op_timeout))
            }
        }
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut con = self.manager.clone();
        let key = key.to_string();
        let raw = self
            .run(async move { con.get::<_, Option<Vec<u8>>>(key).await })
            .await?;
        Ok(raw.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        let key = key.to_string();
        let secs = ttl.as_secs().max(1);
        self.run(async move { con.set_ex::<_, _, ()>(key, value.as_ref(), secs).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.manager.clone();
        let key = key.to_string();
        let removed = self
            .run(async move { con.del::<_, i64>(key).await })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.manager.clone();
        let key = key.to_string();
        self.run(async move { con.exists::<_, bool>(key).await })
            .await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        // Each SCAN step is a bounded, independently timed-out round trip.
        loop {
            let mut con = self.manager.clone();
            let pattern = pattern.to_string();
            let batch = self.scan_batch;
            let (next, page): (u64, Vec<String>) = self
                .run(async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(batch)
                        .query_async(&mut con)
                        .await
                })
                .await?;

            keys.extend(page);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut con = self.manager.clone();
        let key = key.to_string();
        self.run(async move { con.incr::<_, _, i64>(key, delta).await })
            .await
    }

    async fn decr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut con = self.manager.clone();
        let key = key.to_string();
        self.run(async move { con.decr::<_, _, i64>(key, delta).await })
            .await
    }

    async fn hash_set(&self, key: &str, field: &str, value: Bytes) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        let key = key.to_string();
        let field = field.to_string();
        self.run(async move {
            con.hset::<_, _, _, i64>(key, field, value.as_ref()).await
        })
        .await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Bytes>, StoreError> {
        let mut con = self.manager.clone();
        let key = key.to_string();
        let field = field.to_string();
        let raw = self
            .run(async move { con.hget::<_, _, Option<Vec<u8>>>(key, field).await })
            .await?;
        Ok(raw.map(Bytes::from))
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, Bytes)>, StoreError> {
        let mut con = self.manager.clone();
        let key = key.to_string();
        let raw = self
            .run(async move { con.hgetall::<_, Vec<(String, Vec<u8>)>>(key).await })
            .await?;
        Ok(raw.into_iter().map(|(f, v)| (f, Bytes::from(v))).collect())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut con = self.manager.clone();
        let key = key.to_string();
        let field = field.to_string();
        let removed = self
            .run(async move { con.hdel::<_, _, i64>(key, field).await })
            .await?;
        Ok(removed > 0)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
