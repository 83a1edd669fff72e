//! Cache Module
//!
//! Shard cache engine: items linked in recency order inside a transactional
//! store, sliding and absolute expiration, and byte-budgeted eviction.

mod clock;
mod entry;
mod expiration;
pub mod linked;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{accounted_size, CacheStoreMetadata, CachedItem};
pub use expiration::{compute_expirations, EntryOptions, Expirations};
pub use linked::{LinkChanges, LinkedDictionary};
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{shard_byte_budget, CacheStore, TrimReport, DEFAULT_STEP_PAUSE};

// == Public Constants ==
/// Bytes added to every value's length when accounting shard size
pub const ITEM_OVERHEAD_BYTES: u64 = 250;

/// Bytes in one megabyte of configured budget
pub const BYTES_IN_MEGABYTE: u64 = 1024 * 1024;

/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
