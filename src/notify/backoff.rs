//! Exponential retry policy for SMTP operations.
//!
//! Wraps the `exponential-backoff` schedule with the two give-up conditions
//! the email worker needs: a retry count cap and an elapsed-time budget.
//! Giving up is an error for the caller to log, never a reason to crash the
//! worker.

use std::future::Future;
use std::time::{Duration, Instant};

use exponential_backoff::Backoff;

const EMAIL_MAX_RETRIES: u32 = 15;
const EMAIL_BACKOFF_MIN: Duration = Duration::from_millis(500);
const EMAIL_BACKOFF_MAX: Duration = Duration::from_secs(20);
const EMAIL_MAX_ELAPSED: Duration = Duration::from_secs(120 * 60);

pub struct RetryPolicy {
    max_retries: u32,
    max_elapsed: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, min: Duration, max: Duration, max_elapsed: Duration) -> Self {
        Self {
            max_retries,
            max_elapsed,
            backoff: Backoff::new(max_retries, min, Some(max)),
        }
    }

    /// The schedule every SMTP operation uses.
    pub fn email() -> Self {
        Self::new(EMAIL_MAX_RETRIES, EMAIL_BACKOFF_MIN, EMAIL_BACKOFF_MAX, EMAIL_MAX_ELAPSED)
    }

    /// Run `operation` until it succeeds, the retries are exhausted, or the
    /// elapsed budget is spent. Returns the last error on give-up.
    pub async fn retry<T, E, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if started.elapsed() >= self.max_elapsed {
                        return Err(error);
                    }
                    match self.backoff.next(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                attempt,
                                max_retries = self.max_retries,
                                error = %error,
                                "retrying {what}"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(error),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = quick_policy(5);
        let calls = AtomicU32::new(0);

        let result: Result<u32, String> = policy
            .retry("test op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("not yet".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let policy = quick_policy(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = policy
            .retry("test op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("still down".to_string()) }
            })
            .await;

        assert_eq!(result.unwrap_err(), "still down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_when_elapsed_budget_is_spent() {
        let policy = RetryPolicy::new(
            u32::MAX,
            Duration::from_millis(20),
            Duration::from_millis(20),
            Duration::from_millis(1),
        );

        let result: Result<(), String> = policy
            .retry("test op", || async { Err("still down".to_string()) })
            .await;
        assert!(result.is_err());
    }
}
