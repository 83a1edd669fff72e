//! API Handlers
//!
//! HTTP request handlers for each shard node endpoint. Values travel as raw
//! bytes; expiration options travel as query parameters.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{CacheStore, EntryOptions};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, validate_value, EntryOptionsQuery, HealthResponse, StatsResponse,
    CACHE_MISS_HEADER,
};
use crate::txn::MemoryStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The shard engine served by this node
    pub cache: Arc<CacheStore<MemoryStore>>,
    /// Parent of every request's cancellation token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(cache: CacheStore<MemoryStore>) -> Self {
        Self {
            cache: Arc::new(cache),
            shutdown: CancellationToken::new(),
        }
    }

    /// In-flight requests observe `shutdown` when it fires.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Builds the shard engine for one of `partition_count` shards.
    pub fn from_config(config: &Config, partition_count: u64) -> Result<Self> {
        let store = MemoryStore::with_lock_timeout(config.store_lock_timeout());
        let cache = CacheStore::new(store, config.shard_budget(partition_count)?)?
            .with_retry_policy(config.retry_policy())
            .with_step_pause(config.eviction_step_pause());
        Ok(Self::new(cache))
    }

    fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

fn octet_stream(status: StatusCode, value: Vec<u8>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        value,
    )
        .into_response()
}

/// Handler for GET /cache/:key
///
/// Returns the raw value, or an empty 404 carrying [`CACHE_MISS_HEADER`]
/// on a miss.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    validate_key(&key)?;

    let value = state.cache.get(&key, &state.request_token()).await?;
    Ok(match value {
        Some(value) => octet_stream(StatusCode::OK, value),
        None => (StatusCode::NOT_FOUND, [(CACHE_MISS_HEADER, "1")]).into_response(),
    })
}

/// Handler for PUT /cache/:key
pub async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<EntryOptionsQuery>,
    body: Bytes,
) -> Result<StatusCode> {
    validate_key(&key)?;
    validate_value(&body)?;

    let options = EntryOptions::from(query);
    state
        .cache
        .set(&key, &body, &options, &state.request_token())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /cache/:key/create
///
/// 201 with the stored value when the key was absent, 409 otherwise.
pub async fn create_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<EntryOptionsQuery>,
    body: Bytes,
) -> Result<Response> {
    validate_key(&key)?;
    validate_value(&body)?;

    let options = EntryOptions::from(query);
    match state
        .cache
        .create_if_absent(&key, &body, &options, &state.request_token())
        .await?
    {
        Some(value) => Ok(octet_stream(StatusCode::CREATED, value)),
        None => {
            debug!("Create conflict on {}", key);
            Err(CacheError::StoreConflict(key))
        }
    }
}

/// Handler for POST /cache/:key/refresh
pub async fn refresh_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    validate_key(&key)?;
    state.cache.refresh(&key, &state.request_token()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    validate_key(&key)?;
    state.cache.remove(&key, &state.request_token()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let metadata = state
        .cache
        .snapshot_metadata(&state.request_token())
        .await?;

    Ok(Json(StatsResponse::new(
        metadata,
        state.cache.budget(),
        state.cache.stats(),
    )))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        AppState::new(CacheStore::new(MemoryStore::new(), 1 << 20).unwrap())
    }

    fn minute() -> Query<EntryOptionsQuery> {
        Query(EntryOptionsQuery {
            sliding_expiration_ms: Some(60_000),
            ..EntryOptionsQuery::default()
        })
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state();

        let status = set_handler(
            State(state.clone()),
            Path("test_key".to_string()),
            minute(),
            Bytes::from_static(b"test_value"),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let response = get_handler(State(state), Path("test_key".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let response = get_handler(State(test_state()), Path("nonexistent".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(CACHE_MISS_HEADER));
    }

    #[tokio::test]
    async fn test_set_without_expiration_is_rejected() {
        let result = set_handler(
            State(test_state()),
            Path("k".to_string()),
            Query(EntryOptionsQuery::default()),
            Bytes::from_static(b"v"),
        )
        .await;
        assert_eq!(result, Err(CacheError::MissingExpiration));
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let state = test_state();
        let key = || Path("k".to_string());

        let first = create_handler(State(state.clone()), key(), minute(), Bytes::from_static(b"a"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second =
            create_handler(State(state), key(), minute(), Bytes::from_static(b"b")).await;
        assert!(matches!(second, Err(CacheError::StoreConflict(_))));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let state = test_state();
        set_handler(
            State(state.clone()),
            Path("to_delete".to_string()),
            minute(),
            Bytes::from_static(b"value"),
        )
        .await
        .unwrap();

        let status = delete_handler(State(state.clone()), Path("to_delete".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let response = get_handler(State(state), Path("to_delete".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = test_state();
        set_handler(
            State(state.clone()),
            Path("k".to_string()),
            minute(),
            Bytes::from_static(b"12345"),
        )
        .await
        .unwrap();

        let Json(stats) = stats_handler(State(state)).await.unwrap();
        assert_eq!(stats.size, 255);
        assert_eq!(stats.first_key.as_deref(), Some("k"));
        assert_eq!(stats.counters.sets, 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_requests() {
        let shutdown = CancellationToken::new();
        let state = test_state().with_shutdown(shutdown.clone());
        shutdown.cancel();

        let result = delete_handler(State(state), Path("k".to_string())).await;
        assert_eq!(result, Err(CacheError::Cancelled));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
