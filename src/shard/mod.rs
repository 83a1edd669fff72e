//! Shard Module
//!
//! Key-to-shard routing: cluster discovery, partition lookup, remote shard
//! handles and the sharded client built on top of them.

mod client;
mod cluster;
mod locator;
mod remote;

pub use client::ShardedCacheClient;
pub use cluster::{
    ApplicationManifest, ClusterManifest, ClusterQuery, Page, PartitionInfo, ServiceDescription,
    ServiceManifest, StaticCluster,
};
pub use locator::{
    find_partition, partition_hash, ClusterLocator, LocatorOptions, ShardConnector, ShardLocator,
    DEFAULT_CACHE_SERVICE_TYPE, DEFAULT_ENDPOINT_NAME, DISCOVERY_PAGE_SIZE, WILDCARD_SERVICE_URI,
};
pub use remote::{HttpConnector, RemoteShard, DEFAULT_REQUEST_TIMEOUT};
