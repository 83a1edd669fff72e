//! Distributed cache contract.
//!
//! Implemented by the shard engine, by remote shard handles and by the
//! sharded client, so callers can hold any of them as
//! `Arc<dyn DistributedCache>`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::EntryOptions;
use crate::error::Result;

#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Returns the live value for `key`, refreshing its recency and sliding
    /// window. Absent and expired keys are `None`.
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Option<Vec<u8>>>;

    /// Inserts or replaces `key`.
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Inserts `key` only if it does not exist. Returns the stored value, or
    /// `None` when the key was already present.
    async fn create_if_absent(
        &self,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>>;

    /// Removes `key`; absent keys are ignored.
    async fn remove(&self, key: &str, cancel: &CancellationToken) -> Result<()>;

    /// Same as `get` without returning the value.
    async fn refresh(&self, key: &str, cancel: &CancellationToken) -> Result<()>;
}
