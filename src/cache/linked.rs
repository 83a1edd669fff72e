//! Linked Dictionary Module
//!
//! Keeps the shard's recency order as a doubly linked list whose nodes are
//! the cache items themselves, linked by key. The head (`first_key`) is the
//! least recently used item and the tail (`last_key`) the most recent.
//!
//! Operations never write. They read neighbours through the open
//! transaction and return a [`LinkChanges`] patch set: the updated metadata
//! plus every record whose links changed. The caller applies the patch in
//! the same transaction.

use std::collections::BTreeMap;

use crate::cache::{CacheStoreMetadata, CachedItem};
use crate::error::{CacheError, Result};
use crate::txn::Transaction;

// == Link Changes ==
/// Records to persist after a list operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkChanges {
    pub metadata: CacheStoreMetadata,
    pub items_to_update: BTreeMap<String, CachedItem>,
}

// == Linked Dictionary ==
/// List operations over the items visible to one transaction.
pub struct LinkedDictionary<'a, T: Transaction> {
    tx: &'a T,
}

impl<'a, T: Transaction> LinkedDictionary<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    // == Add Last ==
    /// Links `item` under `key` as the new tail.
    ///
    /// Any links the item carried are replaced. `key` must not currently be
    /// in the list.
    pub async fn add_last(
        &self,
        metadata: &CacheStoreMetadata,
        key: &str,
        mut item: CachedItem,
    ) -> Result<LinkChanges> {
        let mut items_to_update = BTreeMap::new();
        let mut updated = metadata.clone();
        updated.size = metadata.size + item.accounted_size();

        match &metadata.last_key {
            None => {
                item.before_key = None;
                item.after_key = None;
                updated.first_key = Some(key.to_string());
            }
            Some(last) if last == key => {
                return Err(CacheError::Store(format!(
                    "item '{}' is already the tail of the list",
                    key
                )));
            }
            Some(last) => {
                let mut tail = self.fetch(last).await?;
                tail.after_key = Some(key.to_string());
                items_to_update.insert(last.clone(), tail);

                item.before_key = Some(last.clone());
                item.after_key = None;
            }
        }

        updated.last_key = Some(key.to_string());
        items_to_update.insert(key.to_string(), item);

        Ok(LinkChanges {
            metadata: updated,
            items_to_update,
        })
    }

    // == Remove ==
    /// Splices `item` out of the list by relinking its neighbours.
    ///
    /// The removed item itself is not part of the patch; the caller either
    /// deletes it or links it again.
    pub async fn remove(
        &self,
        metadata: &CacheStoreMetadata,
        item: &CachedItem,
    ) -> Result<LinkChanges> {
        let mut items_to_update = BTreeMap::new();
        let mut updated = metadata.clone();
        updated.size = metadata.size.saturating_sub(item.accounted_size());

        match &item.before_key {
            Some(before) => {
                let mut previous = self.fetch(before).await?;
                previous.after_key = item.after_key.clone();
                items_to_update.insert(before.clone(), previous);
            }
            None => updated.first_key = item.after_key.clone(),
        }

        match &item.after_key {
            Some(after) => {
                let mut next = self.fetch(after).await?;
                next.before_key = item.before_key.clone();
                items_to_update.insert(after.clone(), next);
            }
            None => updated.last_key = item.before_key.clone(),
        }

        Ok(LinkChanges {
            metadata: updated,
            items_to_update,
        })
    }

    async fn fetch(&self, key: &str) -> Result<CachedItem> {
        self.tx.get_item(key).await?.ok_or_else(|| {
            CacheError::Store(format!("linked item '{}' is missing from the shard", key))
        })
    }
}
