//! Shard Locator
//!
//! Routes a cache key to the shard that owns it. The key is hashed to a
//! signed 64-bit value and matched against each partition's inclusive
//! range; the handle for that partition is created once and cached.
//!
//! When no store location is configured (or it is `*`), the cluster is
//! scanned once for a service of the cache store type.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::backend::DistributedCache;
use crate::error::{CacheError, Result};
use crate::shard::cluster::{ClusterQuery, PartitionInfo};

/// Service type name matched during discovery.
pub const DEFAULT_CACHE_SERVICE_TYPE: &str = "ShardCache.StatefulService";

/// Endpoint name a shard listener is registered under.
pub const DEFAULT_ENDPOINT_NAME: &str = "CacheStoreServiceListener";

/// Service location meaning "discover it".
pub const WILDCARD_SERVICE_URI: &str = "*";

/// Applications requested per discovery page.
pub const DISCOVERY_PAGE_SIZE: usize = 50;

// == Hashing ==
/// Stable 64-bit hash of a key: the first 8 bytes of its SHA-256 digest,
/// read little-endian.
pub fn partition_hash(key: &str) -> i64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_le_bytes(bytes)
}

/// The partition whose range contains `hash`.
pub fn find_partition(partitions: &[PartitionInfo], hash: i64) -> Option<&PartitionInfo> {
    partitions.iter().find(|partition| partition.contains(hash))
}

// == Traits ==
/// Resolves a cache key to the store that owns it.
#[async_trait]
pub trait ShardLocator: Send + Sync {
    async fn resolve(&self, key: &str) -> Result<Arc<dyn DistributedCache>>;
}

/// Builds a handle for one partition of the cache store service.
pub trait ShardConnector: Send + Sync {
    fn connect(
        &self,
        service: &str,
        partition: &PartitionInfo,
        endpoint_name: &str,
    ) -> Result<Arc<dyn DistributedCache>>;
}

// == Options ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorOptions {
    /// Store service name, or None / `*` to discover it
    pub service_uri: Option<String>,
    pub endpoint_name: String,
    pub service_type_name: String,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            service_uri: None,
            endpoint_name: DEFAULT_ENDPOINT_NAME.to_string(),
            service_type_name: DEFAULT_CACHE_SERVICE_TYPE.to_string(),
        }
    }
}

impl LocatorOptions {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            service_uri: Some(config.cache_store_service_uri.clone()),
            endpoint_name: config.cache_store_endpoint_name.clone(),
            ..Self::default()
        }
    }

    fn configured_service(&self) -> Option<&str> {
        self.service_uri
            .as_deref()
            .filter(|uri| !uri.is_empty() && *uri != WILDCARD_SERVICE_URI)
    }
}

// == Cluster Locator ==
/// [`ShardLocator`] backed by cluster queries.
///
/// The service name and partition list are resolved once per locator.
pub struct ClusterLocator<C: ClusterQuery, K: ShardConnector> {
    cluster: C,
    connector: K,
    options: LocatorOptions,
    service: OnceCell<String>,
    partitions: OnceCell<Vec<PartitionInfo>>,
    handles: DashMap<String, Arc<dyn DistributedCache>>,
}

impl<C: ClusterQuery, K: ShardConnector> ClusterLocator<C, K> {
    pub fn new(cluster: C, connector: K, options: LocatorOptions) -> Self {
        Self {
            cluster,
            connector,
            options,
            service: OnceCell::new(),
            partitions: OnceCell::new(),
            handles: DashMap::new(),
        }
    }

    /// Name of the cache store service, discovering it on first use.
    pub async fn service_name(&self) -> Result<&str> {
        self.service
            .get_or_try_init(|| async {
                if let Some(uri) = self.options.configured_service() {
                    return Ok(uri.to_string());
                }

                match self.discover().await {
                    Some(service) => {
                        info!("Discovered cache store service {}", service);
                        Ok(service)
                    }
                    None => Err(CacheError::CacheStoreNotFound(
                        "no cache store service found in the cluster; set CACHE_STORE_SERVICE_URI to its location"
                            .to_string(),
                    )),
                }
            })
            .await
            .map(String::as_str)
    }

    /// Partitions of the cache store service, fetched on first use.
    pub async fn partitions(&self) -> Result<&[PartitionInfo]> {
        let service = self.service_name().await?;
        self.partitions
            .get_or_try_init(|| async {
                let partitions = self.cluster.list_partitions(service).await?;
                debug!("Service {} has {} partitions", service, partitions.len());
                Ok::<_, CacheError>(partitions)
            })
            .await
            .map(Vec::as_slice)
    }

    /// Number of shards the byte budget is split across.
    pub async fn partition_count(&self) -> Result<usize> {
        self.partitions().await.map(<[PartitionInfo]>::len)
    }

    /// Pages through applications until one holds a service of the cache
    /// store type. Query failures end the scan without a match.
    async fn discover(&self) -> Option<String> {
        let mut token: Option<String> = None;

        loop {
            let page = match self
                .cluster
                .list_applications(token.as_deref(), DISCOVERY_PAGE_SIZE)
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    warn!("Listing applications failed during discovery: {}", err);
                    return None;
                }
            };

            for application in &page.items {
                if let Some(service) = self.find_service_in(application).await {
                    return Some(service);
                }
            }

            if !page.has_more() {
                return None;
            }
            token = page.continuation_token;
        }
    }

    async fn find_service_in(&self, application: &str) -> Option<String> {
        let mut token: Option<String> = None;

        loop {
            let page = match self
                .cluster
                .list_services(application, token.as_deref())
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    debug!("Skipping application {}: {}", application, err);
                    return None;
                }
            };

            if let Some(service) = page
                .items
                .iter()
                .find(|service| service.type_name == self.options.service_type_name)
            {
                return Some(service.name.clone());
            }

            if !page.has_more() {
                return None;
            }
            token = page.continuation_token;
        }
    }
}

#[async_trait]
impl<C: ClusterQuery, K: ShardConnector> ShardLocator for ClusterLocator<C, K> {
    async fn resolve(&self, key: &str) -> Result<Arc<dyn DistributedCache>> {
        let service = self.service_name().await?;
        let partitions = self.partitions().await?;

        let hash = partition_hash(key);
        let partition = find_partition(partitions, hash).ok_or_else(|| {
            CacheError::CacheStoreNotFound(format!(
                "no partition of {} covers hash {}",
                service, hash
            ))
        })?;

        if let Some(handle) = self.handles.get(&partition.id) {
            return Ok(handle.clone());
        }

        match self.handles.entry(partition.id.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                debug!("Connecting to partition {} of {}", partition.id, service);
                let handle =
                    self.connector
                        .connect(service, partition, &self.options.endpoint_name)?;
                entry.insert(handle.clone());
                Ok(handle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, EntryOptions};
    use crate::shard::cluster::{
        ApplicationManifest, ClusterManifest, Page, ServiceDescription, ServiceManifest,
        StaticCluster,
    };
    use crate::txn::MemoryStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Connects each partition to its own in-process engine.
    #[derive(Default)]
    struct LocalConnector {
        connects: AtomicUsize,
        stores: std::sync::Mutex<HashMap<String, Arc<dyn DistributedCache>>>,
    }

    impl ShardConnector for LocalConnector {
        fn connect(
            &self,
            _service: &str,
            partition: &PartitionInfo,
            _endpoint_name: &str,
        ) -> Result<Arc<dyn DistributedCache>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let mut stores = self.stores.lock().unwrap();
            let store = stores.entry(partition.id.clone()).or_insert_with(|| {
                let engine = CacheStore::new(MemoryStore::new(), 1 << 20).unwrap();
                Arc::new(engine) as Arc<dyn DistributedCache>
            });
            Ok(store.clone())
        }
    }

    fn listeners(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("http://node-{}", i)).collect()
    }

    fn cluster(partitions: usize) -> StaticCluster {
        StaticCluster::new(ClusterManifest {
            applications: vec![
                ApplicationManifest {
                    name: "app:/other".to_string(),
                    services: vec![ServiceManifest::uniform(
                        "app:/other/web",
                        "Web.Stateless",
                        DEFAULT_ENDPOINT_NAME,
                        &listeners(1),
                    )],
                },
                ApplicationManifest {
                    name: "app:/shop".to_string(),
                    services: vec![ServiceManifest::uniform(
                        "app:/shop/cache",
                        DEFAULT_CACHE_SERVICE_TYPE,
                        DEFAULT_ENDPOINT_NAME,
                        &listeners(partitions),
                    )],
                },
            ],
        })
    }

    #[test]
    fn test_partition_hash_is_deterministic() {
        assert_eq!(partition_hash("default-user:1"), partition_hash("default-user:1"));
        assert_ne!(partition_hash("default-user:1"), partition_hash("default-user:2"));
    }

    #[test]
    fn test_partition_hash_uses_digest_prefix() {
        // SHA-256("abc") begins ba 78 16 bf 8f 01 cf ea.
        let expected = i64::from_le_bytes([0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea]);
        assert_eq!(partition_hash("abc"), expected);
    }

    #[test]
    fn test_find_partition_boundaries() {
        let partitions = vec![
            PartitionInfo {
                id: "low".into(),
                low_key: i64::MIN,
                high_key: -1,
                endpoints: Default::default(),
            },
            PartitionInfo {
                id: "high".into(),
                low_key: 0,
                high_key: i64::MAX,
                endpoints: Default::default(),
            },
        ];

        assert_eq!(find_partition(&partitions, i64::MIN).unwrap().id, "low");
        assert_eq!(find_partition(&partitions, -1).unwrap().id, "low");
        assert_eq!(find_partition(&partitions, 0).unwrap().id, "high");
        assert_eq!(find_partition(&partitions, i64::MAX).unwrap().id, "high");
        assert!(find_partition(&partitions[..1], 5).is_none());
    }

    #[tokio::test]
    async fn test_discovery_finds_cache_service() {
        let locator = ClusterLocator::new(cluster(2), LocalConnector::default(), LocatorOptions::default());

        assert_eq!(locator.service_name().await.unwrap(), "app:/shop/cache");
        assert_eq!(locator.partition_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_configured_service_skips_discovery() {
        let options = LocatorOptions {
            service_uri: Some("app:/other/web".to_string()),
            ..LocatorOptions::default()
        };
        let locator = ClusterLocator::new(cluster(2), LocalConnector::default(), options);

        assert_eq!(locator.service_name().await.unwrap(), "app:/other/web");
        assert_eq!(locator.partition_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_discovery_failure_is_not_found() {
        let locator = ClusterLocator::new(
            StaticCluster::default(),
            LocalConnector::default(),
            LocatorOptions::default(),
        );

        let result = locator.resolve("key").await;
        assert!(matches!(result, Err(CacheError::CacheStoreNotFound(_))));
    }

    #[tokio::test]
    async fn test_handles_are_cached_per_partition() {
        let connector = LocalConnector::default();
        let locator = ClusterLocator::new(cluster(4), connector, LocatorOptions::default());

        for i in 0..64 {
            locator.resolve(&format!("key-{}", i)).await.unwrap();
        }

        assert!(locator.connector.connects.load(Ordering::SeqCst) <= 4);
        assert_eq!(
            locator.connector.connects.load(Ordering::SeqCst),
            locator.handles.len()
        );
    }

    #[tokio::test]
    async fn test_same_key_routes_to_same_shard() {
        let locator = ClusterLocator::new(cluster(4), LocalConnector::default(), LocatorOptions::default());
        let cancel = CancellationToken::new();
        let options = EntryOptions::sliding(Duration::from_secs(60));

        let shard = locator.resolve("default-user:7").await.unwrap();
        shard.set("default-user:7", b"alice", &options, &cancel).await.unwrap();

        let again = locator.resolve("default-user:7").await.unwrap();
        assert_eq!(
            again.get("default-user:7", &cancel).await.unwrap(),
            Some(b"alice".to_vec())
        );
    }

    /// Fails every application listing after the first page.
    struct BrokenSecondPage {
        inner: StaticCluster,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClusterQuery for BrokenSecondPage {
        async fn list_applications(
            &self,
            continuation_token: Option<&str>,
            max_results: usize,
        ) -> Result<Page<String>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(CacheError::ShardUnavailable("query timed out".into()));
            }
            self.inner.list_applications(continuation_token, max_results).await
        }

        async fn list_services(
            &self,
            application: &str,
            continuation_token: Option<&str>,
        ) -> Result<Page<ServiceDescription>> {
            self.inner.list_services(application, continuation_token).await
        }

        async fn list_partitions(&self, service: &str) -> Result<Vec<PartitionInfo>> {
            self.inner.list_partitions(service).await
        }
    }

    #[tokio::test]
    async fn test_discovery_pages_through_applications() {
        // The cache service lives in the 51st application.
        let mut applications: Vec<ApplicationManifest> = (0..50)
            .map(|i| ApplicationManifest {
                name: format!("app:/filler-{}", i),
                services: Vec::new(),
            })
            .collect();
        applications.push(ApplicationManifest {
            name: "app:/late".to_string(),
            services: vec![ServiceManifest::uniform(
                "app:/late/cache",
                DEFAULT_CACHE_SERVICE_TYPE,
                DEFAULT_ENDPOINT_NAME,
                &listeners(1),
            )],
        });
        let cluster = StaticCluster::new(ClusterManifest { applications });

        let locator = ClusterLocator::new(cluster.clone(), LocalConnector::default(), LocatorOptions::default());
        assert_eq!(locator.service_name().await.unwrap(), "app:/late/cache");

        // A failing query on the second page ends discovery without a match.
        let broken = BrokenSecondPage {
            inner: cluster,
            calls: AtomicUsize::new(0),
        };
        let locator = ClusterLocator::new(broken, LocalConnector::default(), LocatorOptions::default());
        assert!(matches!(
            locator.service_name().await,
            Err(CacheError::CacheStoreNotFound(_))
        ));
    }
}
