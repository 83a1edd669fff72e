//! Request DTOs for the shard node API
//!
//! Expiration options travel as query parameters; values travel as the raw
//! request body.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{EntryOptions, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
use crate::error::{CacheError, Result};

/// Query parameters for `PUT /cache/:key` and `POST /cache/:key/create`
///
/// # Fields
/// - `absolute_expiration`: RFC 3339 timestamp
/// - `absolute_expiration_relative_to_now_ms`: expiry relative to the request
/// - `sliding_expiration_ms`: sliding window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptionsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_expiration_relative_to_now_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sliding_expiration_ms: Option<u64>,
}

impl From<&EntryOptions> for EntryOptionsQuery {
    fn from(options: &EntryOptions) -> Self {
        Self {
            absolute_expiration: options.absolute_expiration,
            absolute_expiration_relative_to_now_ms: options
                .absolute_expiration_relative_to_now
                .map(duration_to_millis),
            sliding_expiration_ms: options.sliding_expiration.map(duration_to_millis),
        }
    }
}

impl From<EntryOptionsQuery> for EntryOptions {
    fn from(query: EntryOptionsQuery) -> Self {
        Self {
            absolute_expiration: query.absolute_expiration,
            absolute_expiration_relative_to_now: query
                .absolute_expiration_relative_to_now_ms
                .map(Duration::from_millis),
            sliding_expiration: query.sliding_expiration_ms.map(Duration::from_millis),
        }
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Validates a cache key taken from the request path
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

/// Validates a value taken from the request body
pub fn validate_value(value: &[u8]) -> Result<()> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(CacheError::InvalidRequest(format!(
            "Value exceeds maximum size of {} bytes",
            MAX_VALUE_SIZE
        )));
    }
    Ok(())
}
