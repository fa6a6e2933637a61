//! # Call Wrappers
//!
//! Higher-order helpers wrapped around remote calls:
//!
//! - [`retry`]: re-runs an operation on retryable [`ApiError`]s with
//!   exponential backoff, returning the last error once attempts run out.
//! - [`timed`]: logs how long an async operation took.
//!
//! ```text
//!   attempt 1 ──✗ Network──► sleep 1s ──► attempt 2 ──✗ 503──► sleep 2s ──► attempt 3
//!       │                                     │                               │
//!       └─✗ 422 Validation: returned at once  └─✓ Ok                          └─✗ returned
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries, including the first.
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// One attempt, no waiting.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is reached.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut backoff = policy.backoff();
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !should_retry(&e, attempt, policy) => {
                if attempt > 1 {
                    warn!(operation, attempt, error = %e, "Giving up after retries");
                }
                return Err(e);
            }
            Err(e) => {
                let delay = backoff.next_backoff().unwrap_or(policy.max_interval);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Awaits `fut` and logs its duration at debug level.
pub async fn timed<F: Future>(operation: &str, fut: F) -> F::Output {
    let started = Instant::now();
    let output = fut.await;
    debug!(
        operation,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Operation finished"
    );
    output
}

/// Whether a failure on `attempt` (1-based) earns another try.
pub fn should_retry(error: &ApiError, attempt: u32, policy: &RetryPolicy) -> bool {
    error.is_retryable() && attempt < policy.max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = counting();
        let started = tokio::time::Instant::now();

        let result = retry(&RetryPolicy::default(), "push", || {
            let calls = calls.clone();
            async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(ApiError::Network("refused".into())),
                    1 => Err(ApiError::Server { status: 503 }),
                    _ => Ok("ok"),
                }
            }
        })
        .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s then 2s of backoff
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = counting();
        let result: ApiResult<()> = retry(&RetryPolicy::default(), "push", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Timeout)
            }
        })
        .await;

        assert_eq!(result, Err(ApiError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = counting();
        let result: ApiResult<()> = retry(&RetryPolicy::default(), "push", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Validation {
                    status: 422,
                    message: "sku taken".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ApiError::Validation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(should_retry(&ApiError::Timeout, 1, &policy));
        assert!(!should_retry(&ApiError::Timeout, 3, &policy));
        assert!(!should_retry(&ApiError::NotFound("x".into()), 1, &policy));
        assert!(!should_retry(&ApiError::Timeout, 1, &RetryPolicy::none()));
    }

    #[tokio::test]
    async fn test_timed_passes_output_through() {
        assert_eq!(timed("noop", async { 7 }).await, 7);
    }
}
