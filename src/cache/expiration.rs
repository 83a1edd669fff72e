//! Expiration Policy
//!
//! Resolves caller-supplied entry options into the absolute and sliding
//! expiration stored with each item.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Entry Options ==
/// Expiration settings supplied with a `set` or `create_if_absent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Fixed point in time after which the entry is missing
    pub absolute_expiration: Option<DateTime<Utc>>,
    /// Absolute expiration expressed relative to the time of the call
    pub absolute_expiration_relative_to_now: Option<Duration>,
    /// Window re-applied on every successful access
    pub sliding_expiration: Option<Duration>,
}

impl EntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sliding(window: Duration) -> Self {
        Self::new().with_sliding_expiration(window)
    }

    pub fn absolute(at: DateTime<Utc>) -> Self {
        Self::new().with_absolute_expiration(at)
    }

    pub fn relative_to_now(after: Duration) -> Self {
        Self::new().with_absolute_expiration_relative_to_now(after)
    }

    pub fn with_absolute_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.absolute_expiration = Some(at);
        self
    }

    pub fn with_absolute_expiration_relative_to_now(mut self, after: Duration) -> Self {
        self.absolute_expiration_relative_to_now = Some(after);
        self
    }

    pub fn with_sliding_expiration(mut self, window: Duration) -> Self {
        self.sliding_expiration = Some(window);
        self
    }

    /// True when at least one kind of expiration is set.
    pub fn has_expiration(&self) -> bool {
        self.absolute_expiration.is_some()
            || self.absolute_expiration_relative_to_now.is_some()
            || self.sliding_expiration.is_some()
    }
}

/// Resolved expirations for one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expirations {
    pub absolute: DateTime<Utc>,
    pub sliding: Option<Duration>,
}

// == Compute ==
/// Validates `options` at `now` and resolves the expirations to store.
///
/// A relative expiration wins over an explicit timestamp. A sliding window
/// always replaces the absolute value with `now + sliding` for the next
/// expiry check.
pub fn compute_expirations(now: DateTime<Utc>, options: &EntryOptions) -> Result<Expirations> {
    let mut absolute = absolute_expiration(now, options)?;
    let sliding = options.sliding_expiration;

    if let Some(window) = sliding {
        absolute = Some(offset(now, window)?);
    }

    match absolute {
        Some(absolute) => Ok(Expirations { absolute, sliding }),
        None => Err(CacheError::MissingExpiration),
    }
}

fn absolute_expiration(now: DateTime<Utc>, options: &EntryOptions) -> Result<Option<DateTime<Utc>>> {
    if let Some(after) = options.absolute_expiration_relative_to_now {
        return offset(now, after).map(Some);
    }

    match options.absolute_expiration {
        Some(at) if at <= now => Err(CacheError::InvalidExpiration(
            "The absolute expiration value must be in the future".to_string(),
        )),
        other => Ok(other),
    }
}

fn offset(now: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| now.checked_add_signed(by))
        .ok_or_else(|| {
            CacheError::InvalidExpiration(format!("Expiration offset {:?} is out of range", by))
        })
}
