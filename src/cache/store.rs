//! Cache Store Module
//!
//! Shard engine: cache operations over a transactional store, each run
//! through the retry executor as one transaction, plus the size-bounded
//! trim pass driven by the eviction task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::DistributedCache;
use crate::cache::linked::{LinkChanges, LinkedDictionary};
use crate::cache::{
    compute_expirations, CacheStats, CacheStoreMetadata, CachedItem, Clock, EntryOptions,
    Expirations, StatsSnapshot, SystemClock, BYTES_IN_MEGABYTE,
};
use crate::error::{CacheError, Result};
use crate::txn::{execute_with_retry, RetryPolicy, Transaction, TransactionalStore};

/// Pause between trim sub-steps.
pub const DEFAULT_STEP_PAUSE: Duration = Duration::from_millis(100);

// == Shard Budget ==
/// Bytes each shard may hold: the configured total split evenly across
/// partitions.
pub fn shard_byte_budget(max_cache_size_mb: u64, partition_count: u64) -> Result<u64> {
    if partition_count == 0 {
        return Err(CacheError::InvalidConfig(
            "partition count must be greater than zero".to_string(),
        ));
    }

    let budget = max_cache_size_mb.saturating_mul(BYTES_IN_MEGABYTE) / partition_count;
    if budget == 0 {
        return Err(CacheError::InvalidConfig(format!(
            "a {} MB cache split over {} partitions leaves no room per shard",
            max_cache_size_mb, partition_count
        )));
    }
    Ok(budget)
}

// == Trim Report ==
/// Outcome of one trim pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrimReport {
    /// Expired items deleted from the head
    pub removed: u64,
    /// Live items moved from the head to the tail
    pub cycled: u64,
}

enum TrimStep {
    UnderBudget,
    Removed { over_budget: bool },
    Cycled { over_budget: bool },
}

// == Cache Store ==
/// One shard's cache engine.
///
/// Holds no application locks; every operation is a transaction against the
/// backing store, so the engine is shared as `Arc<CacheStore<S>>`.
pub struct CacheStore<S: TransactionalStore> {
    store: S,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    /// Maximum accounted bytes before trimming starts
    budget: u64,
    step_pause: Duration,
    stats: CacheStats,
}

impl<S: TransactionalStore> CacheStore<S> {
    // == Constructor ==
    /// Creates an engine over `store` holding at most `budget` accounted
    /// bytes. A zero budget is rejected.
    pub fn new(store: S, budget: u64) -> Result<Self> {
        if budget == 0 {
            return Err(CacheError::InvalidConfig(
                "shard byte budget must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            budget,
            step_pause: DEFAULT_STEP_PAUSE,
            stats: CacheStats::new(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_step_pause(mut self, step_pause: Duration) -> Self {
        self.step_pause = step_pause;
        self
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn backing_store(&self) -> &S {
        &self.store
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // == Get ==
    /// Returns the live value for `key` and moves it to the tail.
    ///
    /// Sliding items get a new window; absolute-only items keep their
    /// deadline. Expired items are misses and stay where they are until the
    /// trim pass reaches them.
    pub async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        debug!("Get cached item called with key: {}", key);

        let value = execute_with_retry(&self.store, &self.retry, cancel, |tx| {
            self.get_in(tx, key)
        })
        .await?;

        match value {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        Ok(value)
    }

    // == Set ==
    /// Stores `value` under `key` at the tail of the recency list.
    ///
    /// Replacing a live key with no expiration options carries the old
    /// item's expirations forward.
    pub async fn set(
        &self,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_key(key)?;
        debug!("Set cached item called with key: {}", key);

        execute_with_retry(&self.store, &self.retry, cancel, |tx| {
            self.set_in(tx, key, value, options)
        })
        .await?;

        self.stats.record_set();
        Ok(())
    }

    // == Create If Absent ==
    /// Stores `value` only if `key` does not exist yet.
    ///
    /// Returns `None` without modifying anything when the key is present.
    pub async fn create_if_absent(
        &self,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        debug!("Create cached item called with key: {}", key);

        let created = execute_with_retry(&self.store, &self.retry, cancel, |tx| {
            self.create_in(tx, key, value, options)
        })
        .await?;

        match created {
            Some(_) => self.stats.record_create(),
            None => {
                debug!("Key {} already exists, create skipped", key);
                self.stats.record_create_conflict();
            }
        }
        Ok(created)
    }

    // == Remove ==
    /// Deletes `key` and splices it out of the recency list.
    pub async fn remove(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        validate_key(key)?;
        debug!("Remove cached item called with key: {}", key);

        let removed = execute_with_retry(&self.store, &self.retry, cancel, |tx| {
            self.remove_in(tx, key)
        })
        .await?;

        if removed {
            self.stats.record_removal();
        }
        Ok(())
    }

    // == Refresh ==
    pub async fn refresh(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        self.get(key, cancel).await.map(|_| ())
    }

    // == Trim ==
    /// Runs one eviction pass.
    ///
    /// While the shard is over budget the head is examined: expired items
    /// are deleted, live ones are moved to the tail for another cycle. Each
    /// sub-step is its own transaction, separated by the step pause. The
    /// pass ends when the shard fits its budget or `cancel` fires.
    pub async fn trim_to_budget(&self, cancel: &CancellationToken) -> Result<TrimReport> {
        let mut report = TrimReport::default();

        loop {
            let step = execute_with_retry(&self.store, &self.retry, cancel, |tx| {
                self.trim_step(tx)
            })
            .await?;

            let over_budget = match step {
                TrimStep::UnderBudget => false,
                TrimStep::Removed { over_budget } => {
                    report.removed += 1;
                    self.stats.record_evictions(1);
                    over_budget
                }
                TrimStep::Cycled { over_budget } => {
                    report.cycled += 1;
                    self.stats.record_cycled(1);
                    over_budget
                }
            };

            if !over_budget {
                return Ok(report);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(CacheError::Cancelled),
                _ = sleep(self.step_pause) => {}
            }
        }
    }

    // == Metadata ==
    /// Reads the shard metadata record; an untouched shard reports the
    /// empty default.
    pub async fn snapshot_metadata(&self, cancel: &CancellationToken) -> Result<CacheStoreMetadata> {
        execute_with_retry(&self.store, &self.retry, cancel, |tx| async move {
            tx.get_metadata().await.map(Option::unwrap_or_default)
        })
        .await
    }

    /// Writes a link patch set into `tx` and returns its metadata.
    pub async fn apply_changes(tx: &S::Tx, changes: LinkChanges) -> Result<CacheStoreMetadata> {
        for (key, item) in changes.items_to_update {
            tx.set_item(&key, item).await?;
        }
        tx.set_metadata(changes.metadata.clone()).await?;
        Ok(changes.metadata)
    }

    // == Transaction Bodies ==
    async fn get_in(&self, tx: S::Tx, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(item) = tx.get_item(key).await? else {
            return Ok(None);
        };

        let now = self.clock.now();
        if item.is_expired(now) {
            debug!("Key {} is expired, returning miss", key);
            return Ok(None);
        }

        let expirations = compute_expirations(now, &carried_over(&item))?;
        let value = item.value.clone();
        self.write_in(&tx, key, value.clone(), expirations, Some(item))
            .await?;
        Ok(Some(value))
    }

    async fn set_in(
        &self,
        tx: S::Tx,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
    ) -> Result<()> {
        let existing = tx.get_item(key).await?;
        let now = self.clock.now();

        let expirations = match &existing {
            Some(old) if !options.has_expiration() && !old.is_expired(now) => {
                compute_expirations(now, &carried_over(old))?
            }
            _ => compute_expirations(now, options)?,
        };

        self.write_in(&tx, key, value.to_vec(), expirations, existing)
            .await
    }

    async fn create_in(
        &self,
        tx: S::Tx,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
    ) -> Result<Option<Vec<u8>>> {
        if tx.get_item(key).await?.is_some() {
            return Ok(None);
        }

        let expirations = compute_expirations(self.clock.now(), options)?;
        self.write_in(&tx, key, value.to_vec(), expirations, None)
            .await?;
        Ok(Some(value.to_vec()))
    }

    async fn remove_in(&self, tx: S::Tx, key: &str) -> Result<bool> {
        let Some(old) = tx.remove_item(key).await? else {
            return Ok(false);
        };

        let metadata = tx.get_metadata().await?.unwrap_or_default();
        let changes = LinkedDictionary::new(&tx).remove(&metadata, &old).await?;
        Self::apply_changes(&tx, changes).await?;
        Ok(true)
    }

    /// Unlinks `existing` if given, then links a fresh item at the tail.
    async fn write_in(
        &self,
        tx: &S::Tx,
        key: &str,
        value: Vec<u8>,
        expirations: Expirations,
        existing: Option<CachedItem>,
    ) -> Result<()> {
        let linked = LinkedDictionary::new(tx);
        let mut metadata = tx.get_metadata().await?.unwrap_or_default();

        if let Some(old) = existing {
            if !metadata.is_empty() {
                metadata = Self::apply_changes(tx, linked.remove(&metadata, &old).await?).await?;
            }
        }

        let item = CachedItem::new(value, expirations.sliding, Some(expirations.absolute));
        let changes = linked.add_last(&metadata, key, item).await?;
        Self::apply_changes(tx, changes).await?;
        Ok(())
    }

    async fn trim_step(&self, tx: S::Tx) -> Result<TrimStep> {
        let metadata = tx.get_metadata().await?.unwrap_or_default();
        debug!("Shard size: {} Max size: {}", metadata.size, self.budget);

        if metadata.size <= self.budget {
            return Ok(TrimStep::UnderBudget);
        }

        let first_key = metadata.first_key.clone().ok_or_else(|| {
            CacheError::Store(format!(
                "shard accounts {} bytes but its list is empty",
                metadata.size
            ))
        })?;
        let head = tx.get_item(&first_key).await?.ok_or_else(|| {
            CacheError::Store(format!("head item '{}' is missing from the shard", first_key))
        })?;

        let linked = LinkedDictionary::new(&tx);
        let expired = head.is_expired(self.clock.now());
        let unlinked = Self::apply_changes(&tx, linked.remove(&metadata, &head).await?).await?;

        if expired {
            info!("Auto removing expired item: {}", first_key);
            tx.remove_item(&first_key).await?;
            return Ok(TrimStep::Removed {
                over_budget: unlinked.size > self.budget,
            });
        }

        debug!("Moving live item {} to the tail", first_key);
        let relinked =
            Self::apply_changes(&tx, linked.add_last(&unlinked, &first_key, head).await?).await?;
        Ok(TrimStep::Cycled {
            over_budget: relinked.size > self.budget,
        })
    }
}

/// Options that reproduce an item's stored expirations.
fn carried_over(item: &CachedItem) -> EntryOptions {
    EntryOptions {
        absolute_expiration: item.absolute_expiration,
        absolute_expiration_relative_to_now: None,
        sliding_expiration: item.sliding_expiration,
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key must not be empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl<S: TransactionalStore> DistributedCache for CacheStore<S> {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Option<Vec<u8>>> {
        CacheStore::get(self, key, cancel).await
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        CacheStore::set(self, key, value, options, cancel).await
    }

    async fn create_if_absent(
        &self,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        CacheStore::create_if_absent(self, key, value, options, cancel).await
    }

    async fn remove(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        CacheStore::remove(self, key, cancel).await
    }

    async fn refresh(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        CacheStore::refresh(self, key, cancel).await
    }
}
