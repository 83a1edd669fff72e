//! Remote shard handles.
//!
//! `RemoteShard` implements [`DistributedCache`] against a shard node's HTTP
//! API. Errors reported by the node come back as their original
//! [`CacheError`] variant; transport failures become `ShardUnavailable`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::DistributedCache;
use crate::cache::EntryOptions;
use crate::error::{CacheError, Result};
use crate::models::{EntryOptionsQuery, ErrorResponse, CACHE_MISS_HEADER};
use crate::shard::cluster::PartitionInfo;
use crate::shard::locator::ShardConnector;

/// Per-request timeout for shard calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// == Remote Shard ==
#[derive(Debug, Clone)]
pub struct RemoteShard {
    client: Client,
    base_url: Url,
}

impl RemoteShard {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            CacheError::InvalidConfig(format!("invalid shard address '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CacheError::InvalidConfig(format!(
                "shard address '{}' cannot be a base URL",
                base_url
            )));
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/cache/{key}[/{action}]` with the key percent-encoded.
    fn url(&self, key: &str, action: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("cache").push(key);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        url
    }

    fn request(&self, method: Method, key: &str, action: Option<&str>) -> RequestBuilder {
        self.client.request(method, self.url(key, action))
    }

    async fn send(&self, request: RequestBuilder, cancel: &CancellationToken) -> Result<Response> {
        cancellable(cancel, async {
            request
                .send()
                .await
                .map_err(|e| CacheError::ShardUnavailable(format!("{}: {}", self.base_url, e)))
        })
        .await
    }

    async fn body(&self, response: Response, cancel: &CancellationToken) -> Result<Vec<u8>> {
        cancellable(cancel, async {
            response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|e| CacheError::ShardUnavailable(format!("{}: {}", self.base_url, e)))
        })
        .await
    }
}

/// Runs `operation` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CacheError::Cancelled),
        result = operation => result,
    }
}

/// Maps a non-success response to the error the node reported. Anything
/// without an error body, such as a 404 from an unknown route, means the
/// address does not point at a shard node.
async fn error_from(response: Response) -> CacheError {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => body.into_error(),
        Err(_) => CacheError::ShardUnavailable(format!("shard responded with {}", status)),
    }
}

#[async_trait]
impl DistributedCache for RemoteShard {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Option<Vec<u8>>> {
        debug!("GET {} from {}", key, self.base_url);
        let response = self.send(self.request(Method::GET, key, None), cancel).await?;

        match response.status() {
            StatusCode::OK => self.body(response, cancel).await.map(Some),
            StatusCode::NOT_FOUND if response.headers().contains_key(CACHE_MISS_HEADER) => {
                Ok(None)
            }
            _ => Err(error_from(response).await),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!("PUT {} to {}", key, self.base_url);
        let request = self
            .request(Method::PUT, key, None)
            .query(&EntryOptionsQuery::from(options))
            .body(value.to_vec());
        let response = self.send(request, cancel).await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from(response).await)
        }
    }

    async fn create_if_absent(
        &self,
        key: &str,
        value: &[u8],
        options: &EntryOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>> {
        debug!("CREATE {} on {}", key, self.base_url);
        let request = self
            .request(Method::POST, key, Some("create"))
            .query(&EntryOptionsQuery::from(options))
            .body(value.to_vec());
        let response = self.send(request, cancel).await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => self.body(response, cancel).await.map(Some),
            StatusCode::CONFLICT => Ok(None),
            _ => Err(error_from(response).await),
        }
    }

    async fn remove(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        debug!("DELETE {} from {}", key, self.base_url);
        let response = self.send(self.request(Method::DELETE, key, None), cancel).await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from(response).await)
        }
    }

    async fn refresh(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        let response = self
            .send(self.request(Method::POST, key, Some("refresh")), cancel)
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from(response).await)
        }
    }
}

// == HTTP Connector ==
/// [`ShardConnector`] producing [`RemoteShard`] handles that share one
/// HTTP client.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::InvalidConfig(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl ShardConnector for HttpConnector {
    fn connect(
        &self,
        service: &str,
        partition: &PartitionInfo,
        endpoint_name: &str,
    ) -> Result<Arc<dyn DistributedCache>> {
        let address = partition.endpoints.get(endpoint_name).ok_or_else(|| {
            CacheError::ShardUnavailable(format!(
                "partition {} of {} has no '{}' endpoint",
                partition.id, service, endpoint_name
            ))
        })?;

        Ok(Arc::new(RemoteShard::new(self.client.clone(), address)?))
    }
}
