//! Bounded retry with exponential backoff for provider calls

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// How often and how patiently to retry a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles every retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    /// Backoff before retry number `attempt` (1-based), with up to 50% jitter
    fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        let jitter_ms = if base_ms > 1 {
            rand::thread_rng().gen_range(0..=base_ms / 2)
        } else {
            0
        };
        Duration::from_millis(exp_ms + jitter_ms)
    }

    /// Run `operation`, retrying while `is_transient` says the error is worth it.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    debug!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        label, e, attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            crate::defaults::DEFAULT_MAX_RETRIES,
            Duration::from_millis(crate::defaults::DEFAULT_RETRY_BASE_MS),
        )
    }
}
