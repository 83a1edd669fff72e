//! Failure injection for retry tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{CacheStoreMetadata, CachedItem};
use crate::error::{CacheError, Result};
use crate::txn::{MemoryStore, MemoryTransaction, Transaction, TransactionalStore};

/// Wraps a [`MemoryStore`] and fails the first `transient_commits` commits
/// with a transient timeout, counting begins and aborts along the way.
#[derive(Clone)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    remaining_failures: Arc<AtomicU32>,
    begins: Arc<AtomicUsize>,
    aborts: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn failing_commits(inner: MemoryStore, transient_commits: u32) -> Self {
        Self {
            inner,
            remaining_failures: Arc::new(AtomicU32::new(transient_commits)),
            begins: Arc::new(AtomicUsize::new(0)),
            aborts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionalStore for FlakyStore {
    type Tx = FlakyTransaction;

    async fn begin(&self) -> Result<FlakyTransaction> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(FlakyTransaction {
            inner: self.inner.begin().await?,
            remaining_failures: self.remaining_failures.clone(),
            aborts: self.aborts.clone(),
        })
    }
}

#[derive(Clone)]
pub struct FlakyTransaction {
    inner: MemoryTransaction,
    remaining_failures: Arc<AtomicU32>,
    aborts: Arc<AtomicUsize>,
}

#[async_trait]
impl Transaction for FlakyTransaction {
    async fn get_item(&self, key: &str) -> Result<Option<CachedItem>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, item: CachedItem) -> Result<()> {
        self.inner.set_item(key, item).await
    }

    async fn remove_item(&self, key: &str) -> Result<Option<CachedItem>> {
        self.inner.remove_item(key).await
    }

    async fn get_metadata(&self) -> Result<Option<CacheStoreMetadata>> {
        self.inner.get_metadata().await
    }

    async fn set_metadata(&self, metadata: CacheStoreMetadata) -> Result<()> {
        self.inner.set_metadata(metadata).await
    }

    async fn commit(&self) -> Result<()> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CacheError::TransientStoreTimeout(
                "injected commit timeout".to_string(),
            ));
        }
        self.inner.commit().await
    }

    async fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.inner.abort().await;
    }
}
