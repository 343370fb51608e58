//! Multi-tier cache core.
//!
//! This module contains the cache data structures and algorithms:
//! - [`key`]: canonical key derivation and glob matching
//! - [`codec`]: value encoding for the backing store
//! - [`local`]: the in-process tier (L1)
//! - [`tracker`]: advisory access-pattern records
//! - [`deps`]: dependency graph for cascading invalidation
//! - [`sweeper`]: cold-entry eviction sweep
//! - [`stats`]: counters and the analytics snapshot
//! - [`coordinator`]: the public API orchestrating all tiers

pub mod codec;
pub mod coordinator;
pub mod deps;
pub mod key;
pub mod local;
pub mod stats;
pub mod sweeper;
pub mod tracker;
