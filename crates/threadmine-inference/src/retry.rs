//! Bounded exponential backoff for embedding and search calls.
//!
//! Only embedding and similarity-search calls go through this helper.
//! Generation and judging calls are never retried here; they abort or
//! degrade their owning phase instead.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use threadmine_core::{Error, Result};

/// Retry policy: attempt count and backoff base.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: threadmine_core::defaults::RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(threadmine_core::defaults::RETRY_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before the given retry (1-indexed): base × 2^(attempt-1).
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Whether an error is worth retrying at all.
///
/// Auth failures and bad input will fail identically on every attempt;
/// transient transport trouble and rate limits may clear.
fn is_retryable(err: &Error) -> bool {
    matches!(
        err,
        Error::Timeout(_) | Error::RateLimited(_) | Error::Request(_)
    )
}

/// Run `operation` with bounded exponential backoff.
///
/// The operation is re-created per attempt via the factory closure. Gives up
/// immediately on non-retryable errors and after `max_attempts` total tries.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(op = op_name, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.max_attempts && is_retryable(&err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
