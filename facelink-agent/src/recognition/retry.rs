use super::RecognitionError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry over retryable recognition failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Run `op` (given the 1-based attempt number) until it succeeds, fails
    /// terminally, or the attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RecognitionError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RecognitionError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= attempts => {
                    return Err(RecognitionError::Exhausted {
                        attempts,
                        last: Box::new(e),
                    })
                }
                Err(e) => {
                    warn!(what, attempt, max_attempts = attempts, error = %e, "Attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
