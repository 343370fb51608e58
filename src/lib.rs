//! lattice-cache: multi-tier read-through caching.
//!
//! A fast in-process tier (L1) in front of a shared Redis tier (L2), pulling
//! through to an authoritative loader on miss and populating tiers backward
//! on the way out:
//!   L1 (per-process, ms) → L2 (shared, network) → loader (authoritative)
//!
//! Beyond the read path, the crate provides dependency-graph cascading
//! invalidation, glob-pattern bulk invalidation, access-pattern tracking with
//! a cold-entry sweep, and a read-only analytics snapshot. The cache can
//! never become the application's point of failure: store outages, timeouts,
//! and undecodable payloads all degrade to misses, while loader errors are
//! handed back to the caller unchanged.
//!
//! ```no_run
//! use lattice_cache::{Config, TieredCache};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = TieredCache::connect(Config::default()).await?;
//!
//! let project = cache
//!     .get_or_load("app:project:42", None, || async {
//!         // Fetch from the authoritative source.
//!         Ok(json!({"id": 42, "name": "apollo"}))
//!     })
//!     .await?;
//!
//! cache.add_dependency("app:project:42", "app:project-report:42");
//! let report = cache.invalidate_dependencies("app:project:42").await;
//! assert!(report.is_complete());
//! # let _ = project;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod store;

pub use cache::coordinator::{CacheError, TieredCache};
pub use cache::deps::{InvalidationFailure, InvalidationReport};
pub use cache::key::KeyCodec;
pub use cache::stats::{KeyUsage, StatsSnapshot};
pub use cache::sweeper::SweepReport;
pub use config::Config;
pub use store::{MemoryStore, RedisStore, RemoteStore, StoreError};
