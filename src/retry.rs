use std::time::Duration;

use futures::future::LocalBoxFuture;
use log::warn;

use crate::error::CrawlError;

/// Bounded attempts with exponentially growing waits in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait after the `attempt`-th failure (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempts run out. `state` is lent to each attempt in turn.
pub async fn with_backoff<S, T, F>(policy: RetryPolicy, state: &mut S, mut op: F) -> Result<T, CrawlError>
where
    S: ?Sized,
    F: for<'a> FnMut(&'a mut S) -> LocalBoxFuture<'a, Result<T, CrawlError>>,
{
    let mut attempt = 1;
    loop {
        match op(state).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
