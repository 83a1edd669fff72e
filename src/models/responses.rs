//! Response DTOs for the shard node API
//!
//! Defines the structure of outgoing JSON bodies. Cache values themselves
//! are returned as raw bytes.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheStoreMetadata, StatsSnapshot};
use crate::error::CacheError;

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Accounted bytes currently stored in the shard
    pub size: u64,
    /// Byte budget the eviction loop trims to
    pub budget: u64,
    /// Least recently used key
    pub first_key: Option<String>,
    /// Most recently used key
    pub last_key: Option<String>,
    /// Operation counters
    #[serde(flatten)]
    pub counters: StatsSnapshot,
}

impl StatsResponse {
    pub fn new(metadata: CacheStoreMetadata, budget: u64, counters: StatsSnapshot) -> Self {
        Self {
            size: metadata.size,
            budget,
            first_key: metadata.first_key,
            last_key: metadata.last_key,
            counters,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Header a node sets on the 404 it returns for a cache miss, so callers
/// can tell a miss from an unknown route.
pub const CACHE_MISS_HEADER: &str = "x-shard-cache-miss";

/// Error response body for all error conditions
///
/// `kind` and `detail` let remote callers rebuild the original error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
    pub kind: String,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
            detail: None,
        }
    }

    /// Converts the body back into the error it was produced from.
    pub fn into_error(self) -> CacheError {
        CacheError::from_kind(&self.kind, self.detail.unwrap_or(self.error))
    }
}
