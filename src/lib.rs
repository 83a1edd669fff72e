//! Shard Cache - A sharded, replicated distributed cache
//!
//! Items live in per-shard transactional dictionaries, linked in recency
//! order, with sliding and absolute expiration and a byte budget enforced by
//! a background eviction loop. Keys are routed to shards by a 64-bit hash.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod shard;
pub mod tasks;
pub mod txn;

pub use api::AppState;
pub use backend::DistributedCache;
pub use config::Config;
pub use error::{CacheError, Result};
pub use shard::{ClusterLocator, HttpConnector, LocatorOptions, ShardedCacheClient, StaticCluster};
pub use tasks::spawn_eviction_task;
