//! Shard Cache node - serves one cache shard over HTTP.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shard_cache::api::create_router;
use shard_cache::{
    spawn_eviction_task, AppState, ClusterLocator, Config, HttpConnector, LocatorOptions,
    StaticCluster,
};

/// Main entry point for a shard node.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Resolve the partition count, from the cluster manifest when one is set
/// 4. Create the shard engine with its share of the byte budget
/// 5. Start background eviction task
/// 6. Serve the node API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shard_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Shard Cache node");

    let config = Config::from_env();
    info!(
        "Configuration loaded: store={}, max_cache_size={}MB, port={}, eviction_interval={}s",
        config.cache_store_service_uri,
        config.max_cache_size_mb,
        config.server_port,
        config.eviction_interval_secs
    );

    let partition_count = match config.cluster_manifest.as_deref() {
        Some(path) => discover_partition_count(&config, path).await?,
        None => config.partition_count,
    };

    let shutdown = CancellationToken::new();
    let state = AppState::from_config(&config, partition_count)
        .context("failed to create shard engine")?
        .with_shutdown(shutdown.clone());
    info!(
        "Shard engine initialized with budget of {} bytes ({} partitions)",
        state.cache.budget(),
        partition_count
    );

    let eviction_handle = spawn_eviction_task(
        state.cache.clone(),
        config.eviction_interval(),
        shutdown.clone(),
    );

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Err(e) = eviction_handle.await {
        warn!("Eviction task ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Finds the cache store service in the manifest and counts its partitions.
async fn discover_partition_count(config: &Config, manifest: &str) -> anyhow::Result<u64> {
    let cluster = StaticCluster::from_file(manifest)?;
    let locator = ClusterLocator::new(
        cluster,
        HttpConnector::new()?,
        LocatorOptions::from_config(config),
    );

    let service = locator.service_name().await?.to_string();
    let count = locator.partition_count().await?;
    info!("Discovered store {} with {} partitions", service, count);
    Ok(count as u64)
}

/// Waits for Ctrl+C or SIGTERM, then cancels `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Stops eviction and cancels in-flight requests
    shutdown.cancel();
}
