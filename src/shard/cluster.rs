//! Cluster queries used for store discovery and partition lookup.
//!
//! `ClusterQuery` mirrors the paged management queries of a cluster
//! manager: applications, the services inside each application, and the
//! partitions of a service. `StaticCluster` answers them from a JSON
//! manifest.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Services returned per `list_services` page by [`StaticCluster`].
const SERVICE_PAGE_SIZE: usize = 50;

/// One page of a paged query. An absent or empty token marks the last page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continuation_token: Option<String>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.continuation_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub name: String,
    pub type_name: String,
}

/// A shard: an inclusive range of the 64-bit key hash space plus the
/// listener addresses of its primary, keyed by endpoint name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub id: String,
    pub low_key: i64,
    pub high_key: i64,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

impl PartitionInfo {
    pub fn contains(&self, hash: i64) -> bool {
        self.low_key <= hash && hash <= self.high_key
    }
}

// == Cluster Query ==
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// Lists application names, at most `max_results` per page.
    async fn list_applications(
        &self,
        continuation_token: Option<&str>,
        max_results: usize,
    ) -> Result<Page<String>>;

    async fn list_services(
        &self,
        application: &str,
        continuation_token: Option<&str>,
    ) -> Result<Page<ServiceDescription>>;

    async fn list_partitions(&self, service: &str) -> Result<Vec<PartitionInfo>>;
}

// == Manifest ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterManifest {
    #[serde(default)]
    pub applications: Vec<ApplicationManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationManifest {
    pub name: String,
    #[serde(default)]
    pub services: Vec<ServiceManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceManifest {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub partitions: Vec<PartitionInfo>,
}

impl ServiceManifest {
    /// A service whose partitions split the whole hash space evenly, one
    /// per entry of `listeners`, each reachable under `endpoint_name`.
    pub fn uniform(
        name: impl Into<String>,
        type_name: impl Into<String>,
        endpoint_name: &str,
        listeners: &[String],
    ) -> Self {
        let count = listeners.len() as i128;
        let span = (i64::MAX as i128) - (i64::MIN as i128) + 1;

        let partitions = listeners
            .iter()
            .enumerate()
            .map(|(index, listener)| {
                let index = index as i128;
                let low = i64::MIN as i128 + span * index / count;
                let high = i64::MIN as i128 + span * (index + 1) / count - 1;
                PartitionInfo {
                    id: format!("partition-{}", index),
                    low_key: low as i64,
                    high_key: high as i64,
                    endpoints: BTreeMap::from([(endpoint_name.to_string(), listener.clone())]),
                }
            })
            .collect();

        Self {
            name: name.into(),
            type_name: type_name.into(),
            partitions,
        }
    }
}

// == Static Cluster ==
/// [`ClusterQuery`] over a fixed manifest.
#[derive(Debug, Clone, Default)]
pub struct StaticCluster {
    manifest: ClusterManifest,
}

impl StaticCluster {
    pub fn new(manifest: ClusterManifest) -> Self {
        Self { manifest }
    }

    /// Loads a JSON manifest from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CacheError::InvalidConfig(format!(
                "cannot read cluster manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map(Self::new)
            .map_err(|e| CacheError::InvalidConfig(format!("invalid cluster manifest: {}", e)))
    }

    pub fn manifest(&self) -> &ClusterManifest {
        &self.manifest
    }

    fn service(&self, name: &str) -> Option<&ServiceManifest> {
        self.manifest
            .applications
            .iter()
            .flat_map(|app| app.services.iter())
            .find(|service| service.name == name)
    }
}

/// Slices `items` at the offset encoded in `token`.
fn page_of<T: Clone>(items: &[T], token: Option<&str>, size: usize) -> Result<Page<T>> {
    let start = match token {
        None | Some("") => 0,
        Some(token) => token.parse::<usize>().map_err(|_| {
            CacheError::InvalidRequest(format!("unknown continuation token '{}'", token))
        })?,
    };
    let size = size.max(1);
    let end = items.len().min(start.saturating_add(size));

    Ok(Page {
        items: items.get(start..end).unwrap_or_default().to_vec(),
        continuation_token: (end < items.len()).then(|| end.to_string()),
    })
}

#[async_trait]
impl ClusterQuery for StaticCluster {
    async fn list_applications(
        &self,
        continuation_token: Option<&str>,
        max_results: usize,
    ) -> Result<Page<String>> {
        let names: Vec<String> = self
            .manifest
            .applications
            .iter()
            .map(|app| app.name.clone())
            .collect();
        page_of(&names, continuation_token, max_results)
    }

    async fn list_services(
        &self,
        application: &str,
        continuation_token: Option<&str>,
    ) -> Result<Page<ServiceDescription>> {
        let app = self
            .manifest
            .applications
            .iter()
            .find(|app| app.name == application)
            .ok_or_else(|| {
                CacheError::CacheStoreNotFound(format!("application {} does not exist", application))
            })?;

        let services: Vec<ServiceDescription> = app
            .services
            .iter()
            .map(|service| ServiceDescription {
                name: service.name.clone(),
                type_name: service.type_name.clone(),
            })
            .collect();
        page_of(&services, continuation_token, SERVICE_PAGE_SIZE)
    }

    async fn list_partitions(&self, service: &str) -> Result<Vec<PartitionInfo>> {
        self.service(service)
            .map(|service| service.partitions.clone())
            .ok_or_else(|| {
                CacheError::CacheStoreNotFound(format!("service {} does not exist", service))
            })
    }
}
