//! Bounded retry around a single fallible async operation

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, warn};

/// Retries an operation up to `max_attempts` times in total.
///
/// Every failure is retried; the operation is re-run unchanged, one attempt at
/// a time. There is no backoff beyond an optional fixed pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// A policy making at most `max_attempts` attempts (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
        }
    }

    /// Pause for `delay` between consecutive attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// Returns the first success, or the error of the last attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            debug!("{} attempt {}/{}", label, attempt, self.max_attempts);

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "{} failed (attempt {}/{}): {:#}",
                        label, attempt, self.max_attempts, e
                    );
                    last_error = Some(e);

                    if attempt < self.max_attempts && !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("{} made no attempts", label)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
