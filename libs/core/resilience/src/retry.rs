//! Retry with exponential backoff and uniform jitter.

use crate::error::Retryable;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for outbound calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Upper bound on the computed delay (before jitter).
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Backoff before retry number `attempt` (1-based), without jitter:
    /// `min(max_delay, base_delay * backoff_factor^(attempt-1))`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scaled = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent as i32);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Backoff plus a uniform jitter drawn from `[0, base_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let backoff = self.backoff_for_attempt(attempt);
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter_ms = if base_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..base_ms)
        };
        backoff + Duration::from_millis(jitter_ms)
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 1 s base, factor 2, 30 s cap: the default for agent calls.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Retry an async operation under a policy.
///
/// Only errors reporting `retryable() == true` are retried; the first
/// non-retryable error (and the final attempt's error) is returned to the
/// caller. Each attempt is logged with the correlation ID.
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    correlation_id: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        correlation_id = %correlation_id,
                        attempt = %attempt,
                        "Operation succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.retryable() || attempt >= policy.max_attempts {
                    if e.retryable() {
                        warn!(
                            correlation_id = %correlation_id,
                            attempts = %attempt,
                            error = %e,
                            "Giving up after exhausting retries"
                        );
                    }
                    return Err(e);
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    correlation_id = %correlation_id,
                    attempt = %attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(10))
    }

    #[test]
    fn test_backoff_progression() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default().with_max_delay(Duration::from_secs(3));
        assert_eq!(policy.backoff_for_attempt(10), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_stays_below_base_delay() {
        let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(100));
        for _ in 0..20 {
            let delay = policy.delay_for_attempt(1);
            let backoff = policy.backoff_for_attempt(1);
            assert!(delay >= backoff);
            assert!(delay < backoff + Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn test_retries_retryable_errors() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_policy(&fast_policy(3), "corr-1", || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(CallError::connection("flaky"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_validation_errors() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), CallError> = retry_with_policy(&fast_policy(3), "corr-2", || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CallError::validation("bad input"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), CallError> = retry_with_policy(&fast_policy(3), "corr-3", || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CallError::timeout("slow"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
