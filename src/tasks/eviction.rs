//! Eviction Task
//!
//! Background task that periodically trims the shard back under its byte
//! budget. Stops when its cancellation token fires, including in the middle
//! of a trim pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::error::CacheError;
use crate::txn::TransactionalStore;

/// Interval between trim passes.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(15);

/// Spawns the eviction loop for one shard.
///
/// Each cycle runs one trim pass, then sleeps `interval`. The task exits
/// once `cancel` fires.
///
/// # Example
/// ```ignore
/// let cancel = CancellationToken::new();
/// let handle = spawn_eviction_task(store.clone(), Duration::from_secs(15), cancel.clone());
/// // Later, during shutdown:
/// cancel.cancel();
/// handle.await?;
/// ```
pub fn spawn_eviction_task<S: TransactionalStore>(
    store: Arc<CacheStore<S>>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting eviction task with interval of {:?} and budget of {} bytes",
            interval,
            store.budget()
        );

        loop {
            match store.trim_to_budget(&cancel).await {
                Ok(report) if report.removed > 0 || report.cycled > 0 => {
                    info!(
                        "Eviction pass: removed {} expired items, cycled {} live items",
                        report.removed, report.cycled
                    );
                }
                Ok(_) => debug!("Eviction pass: shard within budget"),
                Err(CacheError::Cancelled) => break,
                Err(err) => warn!("Eviction pass failed: {}", err),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Eviction task shutting down");
    })
}
