use super::types::{RetryConfig, RetryOutcome};
use crate::error::{Error, Result};
use crate::metrics;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry executor with exponential backoff and additive jitter
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `operation` until it succeeds or `max_retries` attempts have
    /// been made.
    ///
    /// On success the returned outcome carries the 1-indexed attempt that
    /// produced the value. When every attempt fails the last error is wrapped
    /// in [`Error::RetriesExhausted`].
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<RetryOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = self.config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, max_retries, "Executing request");

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Request succeeded after retries");
                    }
                    metrics::record_retry_attempt("success");
                    return Ok(RetryOutcome { value, attempt });
                }
                Err(e) => {
                    if attempt >= max_retries {
                        warn!(
                            attempt,
                            max_retries,
                            error = %e,
                            "Request failed after max retries"
                        );
                        metrics::record_retry_attempt("exhausted");
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }

                    let wait = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying after backoff"
                    );
                    metrics::record_retry_attempt("retry");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed):
    /// `base_delay * 2^(attempt - 1) + uniform(0, jitter_max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let exponential = self.config.base_delay().saturating_mul(1u32 << exponent);
        let jitter = self
            .config
            .jitter_max()
            .mul_f64(rand::thread_rng().gen::<f64>());

        exponential.saturating_add(jitter)
    }
}
