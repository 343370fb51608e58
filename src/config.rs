//! Runtime configuration for lattice-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All tuning knobs (TTLs, store timeouts, sweep thresholds, codec settings)
//! live here so tests and deployments can build isolated instances.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application-wide key namespace prefix (`<app>:<logical>:<hash>`).
    pub app_prefix: String,

    /// Default TTL in seconds, applied whenever a caller omits a TTL.
    pub default_ttl_secs: u64,

    /// Shared backing store settings.
    pub store: StoreConfig,

    /// Cold-entry sweep tuning.
    pub sweep: SweepConfig,

    /// Value encoding settings.
    pub codec: CodecConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_prefix: "app".to_string(),
            default_ttl_secs: 300,
            store: StoreConfig::default(),
            sweep: SweepConfig::default(),
            codec: CodecConfig::default(),
        }
    }
}

/// Backing store (L2) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection URL (e.g. "redis://127.0.0.1:6379").
    pub url: String,

    /// Per-operation timeout in milliseconds. A timed-out operation is
    /// treated the same as an unreachable store.
    pub op_timeout_ms: u64,

    /// COUNT hint for cursor-based scans.
    pub scan_batch: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            op_timeout_ms: 250,
            scan_batch: 100,
        }
    }
}

/// Cold-entry sweep thresholds.
///
/// An L1 entry is purged by the sweep when it has not been accessed within
/// `staleness_secs` AND its access frequency is below `min_frequency`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Staleness window in seconds.
    pub staleness_secs: u64,

    /// Minimum accesses per second to be considered warm.
    pub min_frequency: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 900,
            min_frequency: 0.01,
        }
    }
}

/// Value encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Payloads at or above this size (bytes) are zstd-compressed before
    /// being written to the backing store.
    pub compress_threshold: usize,

    /// zstd compression level (1-22).
    pub zstd_level: i32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compress_threshold: 4096,
            zstd_level: 3,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Default TTL as a [`Duration`].
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs.max(1))
    }

    /// Resolve a caller-supplied TTL to a positive duration.
    ///
    /// `None` and zero both mean "apply the configured default"; an entry is
    /// never stored without an expiry.
    pub fn resolve_ttl(&self, ttl: Option<Duration>) -> Duration {
        match ttl {
            Some(t) if !t.is_zero() => t,
            _ => self.default_ttl(),
        }
    }

    /// Staleness window as a [`Duration`].
    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.sweep.staleness_secs)
    }

    /// Per-operation store timeout as a [`Duration`].
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.store.op_timeout_ms)
    }
}
