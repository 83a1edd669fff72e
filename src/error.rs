//! Error types for the shard cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine, locator and shard node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Absolute expiration is not in the future or cannot be represented
    #[error("Invalid expiration: {0}")]
    InvalidExpiration(String),

    /// Neither absolute nor sliding expiration was supplied
    #[error("Either absolute or sliding expiration needs to be provided")]
    MissingExpiration,

    /// The transactional store timed out; safe to retry
    #[error("Transient store timeout: {0}")]
    TransientStoreTimeout(String),

    /// Create-if-absent found an existing key
    #[error("Key already exists: {0}")]
    StoreConflict(String),

    /// No cache store could be located for the key
    #[error("Cache store not found: {0}")]
    CacheStoreNotFound(String),

    /// The shard owning the key could not be reached
    #[error("Shard unavailable: {0}")]
    ShardUnavailable(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid construction parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Permanent store failure or inconsistent records
    #[error("Store error: {0}")]
    Store(String),

    /// The operation observed its cancellation token
    #[error("Operation cancelled")]
    Cancelled,
}

impl CacheError {
    /// Returns true for failures the retry executor may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::TransientStoreTimeout(_))
    }

    /// Stable name used on the wire between shard nodes and remote handles.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::InvalidExpiration(_) => "invalid_expiration",
            CacheError::MissingExpiration => "missing_expiration",
            CacheError::TransientStoreTimeout(_) => "transient_store_timeout",
            CacheError::StoreConflict(_) => "store_conflict",
            CacheError::CacheStoreNotFound(_) => "cache_store_not_found",
            CacheError::ShardUnavailable(_) => "shard_unavailable",
            CacheError::InvalidRequest(_) => "invalid_request",
            CacheError::InvalidConfig(_) => "invalid_config",
            CacheError::Store(_) => "store",
            CacheError::Cancelled => "cancelled",
        }
    }

    /// The message carried by the variant, without the display prefix.
    pub fn detail(&self) -> Option<&str> {
        match self {
            CacheError::InvalidExpiration(m)
            | CacheError::TransientStoreTimeout(m)
            | CacheError::StoreConflict(m)
            | CacheError::CacheStoreNotFound(m)
            | CacheError::ShardUnavailable(m)
            | CacheError::InvalidRequest(m)
            | CacheError::InvalidConfig(m)
            | CacheError::Store(m) => Some(m),
            CacheError::MissingExpiration | CacheError::Cancelled => None,
        }
    }

    /// Rebuilds an error from its wire kind and detail message.
    pub fn from_kind(kind: &str, message: String) -> Self {
        match kind {
            "invalid_expiration" => CacheError::InvalidExpiration(message),
            "missing_expiration" => CacheError::MissingExpiration,
            "transient_store_timeout" => CacheError::TransientStoreTimeout(message),
            "store_conflict" => CacheError::StoreConflict(message),
            "cache_store_not_found" => CacheError::CacheStoreNotFound(message),
            "invalid_request" => CacheError::InvalidRequest(message),
            "invalid_config" => CacheError::InvalidConfig(message),
            "store" => CacheError::Store(message),
            "cancelled" => CacheError::Cancelled,
            _ => CacheError::ShardUnavailable(message),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CacheError::InvalidExpiration(_)
            | CacheError::MissingExpiration
            | CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::StoreConflict(_) => StatusCode::CONFLICT,
            CacheError::CacheStoreNotFound(_) => StatusCode::NOT_FOUND,
            CacheError::TransientStoreTimeout(_) | CacheError::ShardUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::InvalidConfig(_) | CacheError::Store(_) | CacheError::Cancelled => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "detail": self.detail(),
        }));

        (self.status(), body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the shard cache.
pub type Result<T> = std::result::Result<T, CacheError>;
