//! Configuration Module
//!
//! Handles loading and managing node configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::shard_byte_budget;
use crate::error::Result;
use crate::txn::RetryPolicy;

/// Node configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store service name, or `*` to discover it by type
    pub cache_store_service_uri: String,
    /// Endpoint name under which shard listeners are published
    pub cache_store_endpoint_name: String,
    /// Tenant prefix applied to every key by the sharded client
    pub cache_store_id: String,
    /// Total byte budget across all shards, in megabytes
    pub max_cache_size_mb: u64,
    /// Number of shards the budget is split across
    pub partition_count: u64,
    /// Background eviction interval in seconds
    pub eviction_interval_secs: u64,
    /// Pause between trim sub-steps in milliseconds
    pub eviction_step_pause_ms: u64,
    /// Attempts per operation before a transient failure surfaces
    pub retry_max_attempts: u32,
    /// Base retry delay in milliseconds
    pub retry_initial_delay_ms: u64,
    /// MemoryStore lock wait in milliseconds
    pub store_lock_timeout_ms: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Optional path to a JSON cluster manifest
    pub cluster_manifest: Option<String>,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_STORE_SERVICE_URI` - Store service or `*` (default: `*`)
    /// - `CACHE_STORE_ENDPOINT_NAME` - Listener name (default: `CacheStoreServiceListener`)
    /// - `CACHE_STORE_ID` - Key prefix (default: `default`)
    /// - `MAX_CACHE_SIZE_MB` - Total budget (default: 100)
    /// - `PARTITION_COUNT` - Shard count (default: 1)
    /// - `EVICTION_INTERVAL_SECS` - Eviction frequency (default: 15)
    /// - `EVICTION_STEP_PAUSE_MS` - Trim sub-step pause (default: 100)
    /// - `RETRY_MAX_ATTEMPTS` - Retry budget (default: 10)
    /// - `RETRY_INITIAL_DELAY_MS` - Retry base delay (default: 200)
    /// - `STORE_LOCK_TIMEOUT_MS` - Store lock wait (default: 4000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLUSTER_MANIFEST` - Cluster manifest path (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_store_service_uri: env_or(
                "CACHE_STORE_SERVICE_URI",
                defaults.cache_store_service_uri,
            ),
            cache_store_endpoint_name: env_or(
                "CACHE_STORE_ENDPOINT_NAME",
                defaults.cache_store_endpoint_name,
            ),
            cache_store_id: env_or("CACHE_STORE_ID", defaults.cache_store_id),
            max_cache_size_mb: env_or("MAX_CACHE_SIZE_MB", defaults.max_cache_size_mb),
            partition_count: env_or("PARTITION_COUNT", defaults.partition_count),
            eviction_interval_secs: env_or(
                "EVICTION_INTERVAL_SECS",
                defaults.eviction_interval_secs,
            ),
            eviction_step_pause_ms: env_or(
                "EVICTION_STEP_PAUSE_MS",
                defaults.eviction_step_pause_ms,
            ),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_initial_delay_ms: env_or(
                "RETRY_INITIAL_DELAY_MS",
                defaults.retry_initial_delay_ms,
            ),
            store_lock_timeout_ms: env_or("STORE_LOCK_TIMEOUT_MS", defaults.store_lock_timeout_ms),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cluster_manifest: env::var("CLUSTER_MANIFEST").ok().filter(|p| !p.is_empty()),
        }
    }

    /// Per-shard byte budget for `partition_count` shards.
    pub fn shard_budget(&self, partition_count: u64) -> Result<u64> {
        shard_byte_budget(self.max_cache_size_mb, partition_count)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
        )
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    pub fn eviction_step_pause(&self) -> Duration {
        Duration::from_millis(self.eviction_step_pause_ms)
    }

    pub fn store_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.store_lock_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_store_service_uri: "*".to_string(),
            cache_store_endpoint_name: "CacheStoreServiceListener".to_string(),
            cache_store_id: "default".to_string(),
            max_cache_size_mb: 100,
            partition_count: 1,
            eviction_interval_secs: 15,
            eviction_step_pause_ms: 100,
            retry_max_attempts: 10,
            retry_initial_delay_ms: 200,
            store_lock_timeout_ms: 4000,
            server_port: 3000,
            cluster_manifest: None,
        }
    }
}
