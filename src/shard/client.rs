//! Sharded cache client.
//!
//! Application-facing cache: namespaces keys under a cache store id,
//! validates expirations before any network call, and forwards each
//! operation to the shard that owns the key.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backend::DistributedCache;
use crate::cache::{compute_expirations, Clock, EntryOptions, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::validate_key;
use crate::shard::locator::ShardLocator;

pub struct ShardedCacheClient<L: ShardLocator> {
    locator: L,
    cache_store_id: String,
    clock: Arc<dyn Clock>,
}

impl<L: ShardLocator> ShardedCacheClient<L> {
    pub fn new(locator: L, cache_store_id: impl Into<String>) -> Self {
        Self {
            locator,
            cache_store_id: cache_store_id.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Client for the tenant named by `CACHE_STORE_ID`.
    pub fn from_config(locator: L, config: &Config) -> Self {
        Self::new(locator, config.cache_store_id.clone())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    /// `"{cache_store_id}-{key}"`, held to the node's key length limit.
    pub fn format_key(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
        }
        let key = format!("{}-{}", self.cache_store_id, key);
        validate_key(&key)?;
        Ok(key)
    }

    async fn route(&self, key: &str) -> Result<(String, Arc<dyn DistributedCache>)> {
        let key = self.format_key(key)?;
        let shard = self.locator.resolve(&key).await?;
        Ok((key, shard))
    }
}

#[async_trait]
impl<L: ShardLocator> DistributedCache for ShardedCacheClient<L> {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Option<Vec<u8>>> {
        let (key, shard) = self.route(key).await?;
        shard.get(&key, cancel).await
    }

    /// Options without any expiration are passed through; the shard keeps
    /// an existing item's expirations or rejects a new key.
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if options.has_expiration() {
            compute_expirations(self.clock.now(), options)?;
        }
        let (key, shard) = self.route(key).await?;
        shard.set(&key, value, options, cancel).await
    }

    async fn create_if_absent(
        &self,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        compute_expirations(self.clock.now(), options)?;
        let (key, shard) = self.route(key).await?;
        shard.create_if_absent(&key, value, options, cancel).await
    }

    async fn remove(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        let (key, shard) = self.route(key).await?;
        shard.remove(&key, cancel).await
    }

    async fn refresh(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        self.get(key, cancel).await.map(|_| ())
    }
}
