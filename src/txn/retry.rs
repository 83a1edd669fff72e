//! Transactional retry executor.
//!
//! Runs a unit of work inside a fresh transaction and commits it. Transient
//! store timeouts abort the transaction and retry with exponential backoff
//! and jitter; every other failure aborts and propagates immediately.
//!
//! # Example
//!
//! ```ignore
//! let policy = RetryPolicy::default();
//! let value = execute_with_retry(&store, &policy, &cancel, |tx| async move {
//!     tx.get_item("key").await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{CacheError, Result};
use crate::txn::{Transaction, TransactionalStore};

/// Attempts made when no explicit budget is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Base delay, and the floor applied to configured delays.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(200);

// Keeps 2^attempt from overflowing on large attempt budgets.
const MAX_BACKOFF_EXPONENT: u32 = 16;

// == Retry Policy ==
/// Retry budget for transactional operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Builds a policy, replacing a zero attempt budget with the default and
    /// raising delays below 200ms to 200ms.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 {
                DEFAULT_MAX_ATTEMPTS
            } else {
                max_attempts
            },
            initial_delay: initial_delay.max(DEFAULT_INITIAL_DELAY),
        }
    }

    /// Near-zero delays, for tests and local tooling.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(1),
        }
    }

    /// Delay slept after the failed attempt `attempt` (0-based):
    /// `2^attempt` times a base delay jittered to 50%..150%.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as u64;
        let jittered = if base == 0 {
            0
        } else {
            fastrand::u64(base / 2..=base + base / 2)
        };
        let factor = 1u64 << attempt.min(MAX_BACKOFF_EXPONENT);
        Duration::from_millis(jittered.saturating_mul(factor))
    }
}

// == Execute With Retry ==
/// Runs `work` in a new transaction until it commits, fails permanently, or
/// exhausts `policy.max_attempts` transient failures.
///
/// `work` receives a handle to the open transaction; the executor owns
/// commit and abort. Backoff sleeps end early when `cancel` fires.
pub async fn execute_with_retry<S, T, F, Fut>(
    store: &S,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut work: F,
) -> Result<T>
where
    S: TransactionalStore + ?Sized,
    F: FnMut(S::Tx) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        let err = match run_once(store, cancel, &mut work).await {
            Ok(value) => {
                if attempt > 0 {
                    info!("Transaction committed after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() => err,
            Err(err) => return Err(err),
        };

        attempt += 1;
        if attempt >= max_attempts {
            warn!(
                "Transaction failed after {} attempts, giving up: {}",
                attempt, err
            );
            return Err(err);
        }

        let delay = policy.backoff(attempt - 1);
        warn!(
            "Transaction failed (attempt {}/{}): {}. Retrying in {:?}...",
            attempt, max_attempts, err, delay
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(CacheError::Cancelled),
            _ = sleep(delay) => {}
        }
    }
}

async fn run_once<S, T, F, Fut>(store: &S, cancel: &CancellationToken, work: &mut F) -> Result<T>
where
    S: TransactionalStore + ?Sized,
    F: FnMut(S::Tx) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // Opening a transaction may wait on the shard lock.
    let tx = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(CacheError::Cancelled),
        tx = store.begin() => tx?,
    };

    let outcome = match work(tx.clone()).await {
        Ok(value) => tx.commit().await.map(|_| value),
        Err(err) => Err(err),
    };

    if outcome.is_err() {
        tx.abort().await;
    }
    outcome
}
