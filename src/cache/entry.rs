//! Cache Entry Module
//!
//! Records persisted in the transactional dictionaries: the linked cache
//! item and the per-shard metadata record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::ITEM_OVERHEAD_BYTES;

// == Cached Item ==
/// A cache value plus its position in the shard's recency list.
///
/// `before_key` points toward the least recently used end (the head),
/// `after_key` toward the most recently used end (the tail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedItem {
    /// The stored value
    pub value: Vec<u8>,
    /// Predecessor in recency order, None for the head
    pub before_key: Option<String>,
    /// Successor in recency order, None for the tail
    pub after_key: Option<String>,
    /// Sliding window re-applied on every successful access
    pub sliding_expiration: Option<Duration>,
    /// Point in time at which the item stops being served
    pub absolute_expiration: Option<DateTime<Utc>>,
}

impl CachedItem {
    // == Constructor ==
    /// Creates an unlinked item.
    pub fn new(
        value: Vec<u8>,
        sliding_expiration: Option<Duration>,
        absolute_expiration: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            value,
            before_key: None,
            after_key: None,
            sliding_expiration,
            absolute_expiration,
        }
    }

    // == Is Expired ==
    /// Checks if the item has expired at `now`.
    ///
    /// Boundary condition: an item is expired once `now >= absolute_expiration`.
    /// Items without an absolute expiration are never written by the store;
    /// if one is found it is treated as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.absolute_expiration {
            Some(expires) => now >= expires,
            None => true,
        }
    }

    /// Bytes this item contributes to the shard size.
    pub fn accounted_size(&self) -> u64 {
        accounted_size(self.value.len())
    }
}

/// Bytes a value of `len` bytes contributes to the shard size.
pub fn accounted_size(len: usize) -> u64 {
    len as u64 + ITEM_OVERHEAD_BYTES
}

// == Cache Store Metadata ==
/// Per-shard bookkeeping: total accounted bytes and the list ends.
///
/// `first_key` and `last_key` are both None exactly when the shard is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStoreMetadata {
    pub size: u64,
    pub first_key: Option<String>,
    pub last_key: Option<String>,
}

impl CacheStoreMetadata {
    pub fn new(size: u64, first_key: Option<String>, last_key: Option<String>) -> Self {
        Self {
            size,
            first_key,
            last_key,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_key.is_none()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 2, 1, 1, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn test_item_creation_is_unlinked() {
        let item = CachedItem::new(b"value".to_vec(), None, Some(at(10)));

        assert!(item.before_key.is_none());
        assert!(item.after_key.is_none());
        assert_eq!(item.accounted_size(), 5 + ITEM_OVERHEAD_BYTES);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let item = CachedItem::new(b"v".to_vec(), None, Some(at(5)));

        assert!(!item.is_expired(at(4)));
        assert!(item.is_expired(at(5)), "Item should be expired at boundary");
        assert!(item.is_expired(at(6)));
    }

    #[test]
    fn test_item_without_absolute_expiration_is_expired() {
        let item = CachedItem::new(b"v".to_vec(), Some(Duration::from_secs(10)), None);
        assert!(item.is_expired(at(0)));
    }

    #[test]
    fn test_default_metadata_is_empty() {
        let metadata = CacheStoreMetadata::default();
        assert!(metadata.is_empty());
        assert_eq!(metadata.size, 0);
        assert!(metadata.last_key.is_none());
    }
}
