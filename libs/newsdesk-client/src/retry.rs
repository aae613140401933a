use crate::config::RetryConfig;
use crate::error::ApiError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Executes an operation with per-attempt timeouts and exponential-backoff
/// retry.
///
/// Only retriable failure classes (transport errors and attempt timeouts)
/// are retried; a received HTTP response of any status is a definite result.
/// The per-attempt timeout is cooperative: a timed-out attempt is abandoned
/// and its eventual late completion is discarded, not cancelled forcibly.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `op` up to `1 + max_retries` times, each attempt bounded by
    /// `attempt_timeout`. The closure receives the attempt index (0-based)
    /// and must produce a fresh future per attempt.
    ///
    /// # Errors
    ///
    /// Propagates the first non-retriable error immediately, or the last
    /// error once attempts are exhausted.
    pub async fn execute<T, F, Fut>(
        &self,
        attempt_timeout: Duration,
        op: F,
    ) -> Result<T, ApiError>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0usize;
        loop {
            let result = match tokio::time::timeout(attempt_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(ApiError::Timeout(attempt_timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.config.max_retries || !err.is_retriable() {
                        return Err(err);
                    }

                    let backoff = backoff_delay(&self.config, attempt);
                    tracing::debug!(
                        retry = attempt + 1,
                        max_retries = self.config.max_retries,
                        error = %err,
                        backoff_ms = backoff.as_millis(),
                        "retrying request after error"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Backoff before retry `attempt` (0-indexed):
/// `base_delay * 2^attempt + jitter(0..jitter_cap)`.
#[must_use]
pub fn backoff_delay(config: &RetryConfig, attempt: usize) -> Duration {
    // Cap the shift; beyond 16 doublings the delay is already absurd and
    // u32 multiplication would overflow anyway.
    let shift = u32::try_from(attempt.min(16)).unwrap_or(16);
    let base = config.base_delay.saturating_mul(1u32 << shift);

    let jitter_cap = config.jitter_cap.as_millis();
    if jitter_cap == 0 {
        return base;
    }
    let jitter_ms = rand::rng().random_range(0..u64::try_from(jitter_cap).unwrap_or(u64::MAX));
    base + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transport_error() -> ApiError {
        ApiError::Transport(Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    fn executor() -> RetryExecutor {
        RetryExecutor::new(RetryConfig::fast())
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_op = calls.clone();

        let result = executor()
            .execute(Duration::from_secs(1), move |_attempt| {
                let calls = calls_in_op.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transport_error())
                    } else {
                        Ok("served")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "served");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retriable_error_propagates_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_op = calls.clone();

        let result: Result<(), _> = executor()
            .execute(Duration::from_secs(1), move |_attempt| {
                let calls = calls_in_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::Status {
                        status: http::StatusCode::UNPROCESSABLE_ENTITY,
                        message: "validation failed".to_owned(),
                        errors: None,
                    })
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(http::StatusCode::UNPROCESSABLE_ENTITY));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry for parsed responses");
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_op = calls.clone();

        let result: Result<(), _> = executor()
            .execute(Duration::from_secs(1), move |_attempt| {
                let calls = calls_in_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(transport_error())
                }
            })
            .await;

        assert!(matches!(result.unwrap_err(), ApiError::Transport(_)));
        // 1 initial + 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn slow_attempts_time_out_and_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_op = calls.clone();

        let result = executor()
            .execute(Duration::from_millis(20), move |_attempt| {
                let calls = calls_in_op.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        // First attempt hangs past the per-attempt budget
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok("eventually")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "eventually");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn timeout_surfaces_when_every_attempt_is_slow() {
        let executor = RetryExecutor::new(RetryConfig {
            max_retries: 1,
            ..RetryConfig::fast()
        });

        let result: Result<(), _> = executor
            .execute(Duration::from_millis(10), |_attempt| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result.unwrap_err() {
            ApiError::Timeout(budget) => assert_eq!(budget, Duration::from_millis(10)),
            other => panic!("expected Timeout, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_retry_makes_a_single_attempt() {
        let executor = RetryExecutor::new(RetryConfig::disabled());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_op = calls.clone();

        let result: Result<(), _> = executor
            .execute(Duration::from_secs(1), move |_attempt| {
                let calls = calls_in_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(transport_error())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            jitter_cap: Duration::ZERO,
        };
        assert_eq!(backoff_delay(&config, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(4000));
    }

    #[test]
    fn jitter_stays_within_cap() {
        let config = RetryConfig::default();
        for attempt in 0..3 {
            let base = Duration::from_millis(1000) * 2u32.pow(attempt);
            for _ in 0..50 {
                let delay = backoff_delay(&config, attempt as usize);
                assert!(delay >= base);
                assert!(delay < base + Duration::from_millis(500));
            }
        }
    }
}
