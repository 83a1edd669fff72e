//! In-process transactional store.
//!
//! Stands in for the replicated dictionary when running a single shard node
//! and in tests. Transactions are serialised per shard: `begin` takes the
//! shard lock, waiting at most `lock_timeout`, and holds it until commit or
//! abort. Writes are buffered and applied on commit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::cache::{CacheStoreMetadata, CachedItem};
use crate::error::{CacheError, Result};
use crate::txn::{Transaction, TransactionalStore};

/// Default time a transaction waits for the shard lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Default)]
struct ShardState {
    entries: HashMap<String, CachedItem>,
    metadata: Option<CacheStoreMetadata>,
}

// == Memory Store ==
/// Committed state of one shard.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<ShardState>>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ShardState::default())),
            lock_timeout,
        }
    }

    /// Committed entries. Waits for any open transaction to finish.
    pub async fn entries(&self) -> HashMap<String, CachedItem> {
        self.state.lock().await.entries.clone()
    }

    /// Committed metadata record, if one was ever written.
    pub async fn metadata(&self) -> Option<CacheStoreMetadata> {
        self.state.lock().await.metadata.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                CacheError::TransientStoreTimeout(format!(
                    "shard lock not acquired within {:?}",
                    self.lock_timeout
                ))
            })?;

        Ok(MemoryTransaction {
            inner: Arc::new(Mutex::new(TxState {
                guard: Some(guard),
                entries: HashMap::new(),
                metadata: None,
            })),
        })
    }
}

// == Memory Transaction ==
struct TxState {
    /// None once committed or aborted
    guard: Option<OwnedMutexGuard<ShardState>>,
    /// Pending entry writes; None marks a removal
    entries: HashMap<String, Option<CachedItem>>,
    metadata: Option<CacheStoreMetadata>,
}

impl TxState {
    fn shard(&self) -> Result<&ShardState> {
        self.guard
            .as_deref()
            .ok_or_else(|| CacheError::Store("transaction already completed".to_string()))
    }

    fn read_item(&self, key: &str) -> Result<Option<CachedItem>> {
        let shard = self.shard()?;
        match self.entries.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => Ok(shard.entries.get(key).cloned()),
        }
    }
}

/// Handle to an open [`MemoryStore`] transaction.
///
/// Dropping every handle without committing aborts the transaction.
#[derive(Clone)]
pub struct MemoryTransaction {
    inner: Arc<Mutex<TxState>>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get_item(&self, key: &str) -> Result<Option<CachedItem>> {
        self.inner.lock().await.read_item(key)
    }

    async fn set_item(&self, key: &str, item: CachedItem) -> Result<()> {
        let mut tx = self.inner.lock().await;
        tx.shard()?;
        tx.entries.insert(key.to_string(), Some(item));
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<Option<CachedItem>> {
        let mut tx = self.inner.lock().await;
        let previous = tx.read_item(key)?;
        tx.entries.insert(key.to_string(), None);
        Ok(previous)
    }

    async fn get_metadata(&self) -> Result<Option<CacheStoreMetadata>> {
        let tx = self.inner.lock().await;
        let shard = tx.shard()?;
        Ok(tx.metadata.clone().or_else(|| shard.metadata.clone()))
    }

    async fn set_metadata(&self, metadata: CacheStoreMetadata) -> Result<()> {
        let mut tx = self.inner.lock().await;
        tx.shard()?;
        tx.metadata = Some(metadata);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut tx = self.inner.lock().await;
        let mut guard = tx
            .guard
            .take()
            .ok_or_else(|| CacheError::Store("transaction already completed".to_string()))?;

        let writes = tx.entries.len();
        for (key, pending) in tx.entries.drain() {
            match pending {
                Some(item) => {
                    guard.entries.insert(key, item);
                }
                None => {
                    guard.entries.remove(&key);
                }
            }
        }
        if let Some(metadata) = tx.metadata.take() {
            guard.metadata = Some(metadata);
        }

        debug!("Committed transaction with {} entry writes", writes);
        Ok(())
    }

    async fn abort(&self) {
        let mut tx = self.inner.lock().await;
        tx.guard = None;
        tx.entries.clear();
        tx.metadata = None;
    }
}
