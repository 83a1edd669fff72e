//! Transactional Store Module
//!
//! The replicated dictionary the cache engine runs against, expressed as a
//! pair of traits, plus the retry executor that is the only place a
//! transaction is ever opened.
//!
//! A store exposes two logical dictionaries per shard: `entries`
//! (key -> [`CachedItem`]) and `metadata` (the single
//! [`CacheStoreMetadata`] record).

mod memory;
mod retry;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::cache::{CacheStoreMetadata, CachedItem};
use crate::error::Result;

pub use memory::{MemoryStore, MemoryTransaction, DEFAULT_LOCK_TIMEOUT};
pub use retry::{execute_with_retry, RetryPolicy};

/// Key under which the shard metadata record is stored.
pub const CACHE_STORE_METADATA_KEY: &str = "CacheStoreMetadata";

// == Transaction ==
/// One open transaction against a shard.
///
/// Handles are cheap clones of the same transaction. Reads observe the
/// transaction's own earlier writes; nothing is visible to other
/// transactions until [`Transaction::commit`]. Item reads are taken with
/// update intent.
#[async_trait]
pub trait Transaction: Clone + Send + Sync + 'static {
    async fn get_item(&self, key: &str) -> Result<Option<CachedItem>>;

    async fn set_item(&self, key: &str, item: CachedItem) -> Result<()>;

    /// Removes an item, returning the value it had.
    async fn remove_item(&self, key: &str) -> Result<Option<CachedItem>>;

    async fn get_metadata(&self) -> Result<Option<CacheStoreMetadata>>;

    async fn set_metadata(&self, metadata: CacheStoreMetadata) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    /// Discards every write. Aborting a completed transaction is a no-op.
    async fn abort(&self);
}

// == Transactional Store ==
/// Factory for transactions on one shard.
#[async_trait]
pub trait TransactionalStore: Send + Sync + 'static {
    type Tx: Transaction;

    /// Opens a new transaction. May fail transiently under contention.
    async fn begin(&self) -> Result<Self::Tx>;
}
