use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::core::errors::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2,
        }
    }
}

impl RetryOptions {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let backoff = self.initial_delay * self.backoff_multiplier.saturating_pow(attempt - 1);
        backoff.min(self.max_delay)
    }
}

/// Run `f`, retrying transient failures with exponential backoff. A
/// rate-limit error carrying a server-supplied cooldown sleeps for that hint
/// instead. The last error is returned unchanged so the HTTP layer can map
/// its kind. `op` is a diagnostic label only.
pub async fn with_retry<T, F, Fut>(op: &str, options: &RetryOptions, mut f: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let last_attempt = attempt >= options.max_attempts;
                if last_attempt || !err.is_retryable() {
                    error!(op, attempt, error = %err, "operation failed permanently");
                    return Err(err);
                }

                let delay = err
                    .retry_after()
                    .unwrap_or_else(|| options.delay_for_attempt(attempt));
                warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
