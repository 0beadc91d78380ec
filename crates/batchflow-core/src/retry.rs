//! Timeout and retry wrappers for asynchronous operations.
//!
//! The engine composes them in a fixed order: the timeout wraps the raw
//! operation and the retry loop wraps the timed operation, so every attempt
//! gets its own fresh timeout window.

use std::future::Future;
use std::time::Duration;

use batchflow_types::error::EngineError;
use batchflow_types::task::RetryOption;

/// Upper bound for a timeout, matching the largest signed 32-bit millisecond
/// delay a timer accepts.
pub const MAX_TIMEOUT_MS: u64 = i32::MAX as u64;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// How many times to run an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub attempts: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Double the delay after every retry.
    pub exponential: bool,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            exponential: false,
        }
    }

    pub fn exponential(mut self, exponential: bool) -> Self {
        self.exponential = exponential;
        self
    }
}

impl From<&RetryOption> for RetryPolicy {
    fn from(option: &RetryOption) -> Self {
        RetryPolicy::new(
            option.maximum_attempts,
            Duration::from_millis(option.attempt_delay_ms),
        )
        .exponential(option.exponential_backoff)
    }
}

// ---------------------------------------------------------------------------
// RetryExecutor
// ---------------------------------------------------------------------------

/// Stateless timeout/retry executor.
pub struct RetryExecutor;

impl RetryExecutor {
    /// Clamp a timeout to `[1, MAX_TIMEOUT_MS]`.
    pub fn clamp_timeout(timeout_ms: u64) -> u64 {
        timeout_ms.clamp(1, MAX_TIMEOUT_MS)
    }

    /// Race `fut` against a timer.
    ///
    /// Returns the future's own result if it settles first. Otherwise returns
    /// [`EngineError::Timeout`] and drops the future, so a late settlement is
    /// never observed.
    pub async fn with_timeout<Fut, T>(fut: Fut, timeout_ms: u64) -> Result<T, EngineError>
    where
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let timeout_ms = Self::clamp_timeout(timeout_ms);
        match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::timeout(timeout_ms)),
        }
    }

    /// Run `op` until it succeeds or the policy's attempts are exhausted.
    pub async fn with_retry<F, Fut, T>(op: F, policy: RetryPolicy) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        Self::with_retry_notify(op, policy, |_, _, _| {}).await
    }

    /// Like [`with_retry`](Self::with_retry), calling
    /// `on_retry(attempt, delay, remaining_attempts)` before each retry.
    ///
    /// `on_retry` is never called after the final attempt. When every attempt
    /// fails the result is [`EngineError::Retry`] holding the last error.
    pub async fn with_retry_notify<F, Fut, T, N>(
        mut op: F,
        policy: RetryPolicy,
        mut on_retry: N,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
        N: FnMut(u32, Duration, u32),
    {
        let total_attempts = policy.attempts.max(1);
        let mut delay = policy.delay;
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= total_attempts => {
                    return Err(EngineError::Retry {
                        attempt,
                        total_attempts,
                        last_error: Box::new(err),
                    });
                }
                Err(err) => {
                    tracing::debug!(
                        attempt,
                        total_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    on_retry(attempt, delay, total_attempts - attempt);
                    tokio::time::sleep(delay).await;
                    if policy.exponential {
                        delay = delay.saturating_mul(2);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Run `op` with the timeout and retry settings of a task.
    ///
    /// A missing timeout means "effectively never", i.e. [`MAX_TIMEOUT_MS`].
    pub async fn execute<F, Fut, T, N>(
        mut op: F,
        option: &RetryOption,
        on_retry: N,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
        N: FnMut(u32, Duration, u32),
    {
        let timeout_ms = option.timeout_ms.unwrap_or(MAX_TIMEOUT_MS);
        Self::with_retry_notify(
            || Self::with_timeout(op(), timeout_ms),
            RetryPolicy::from(option),
            on_retry,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use batchflow_types::error::ErrorKind;
    use tokio::time::Instant;

    use super::*;

    fn failing(message: &str) -> EngineError {
        EngineError::general(ErrorKind::ExecutionFailed, message)
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_returns_value_when_fast() {
        let result = RetryExecutor::with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, EngineError>(42)
            },
            100,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_rejects_when_slow() {
        let err = RetryExecutor::with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(1_000)).await;
                Ok::<_, EngineError>(42)
            },
            100,
        )
        .await
        .unwrap_err();

        match err {
            EngineError::Timeout {
                message,
                timeout_ms,
            } => {
                assert_eq!(message, "The operation timed out");
                assert_eq!(timeout_ms, 100);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_passes_inner_error_through() {
        let err = RetryExecutor::with_timeout(async { Err::<(), _>(failing("inner")) }, 100)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    }

    #[test]
    fn clamp_timeout_bounds() {
        assert_eq!(RetryExecutor::clamp_timeout(0), 1);
        assert_eq!(RetryExecutor::clamp_timeout(500), 500);
        assert_eq!(RetryExecutor::clamp_timeout(u64::MAX), MAX_TIMEOUT_MS);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_calls_exactly_n_times_then_fails() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = RetryExecutor::with_retry(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(failing("always"))
                }
            },
            RetryPolicy::new(3, Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            EngineError::Retry {
                attempt,
                total_attempts,
                last_error,
            } => {
                assert_eq!(attempt, 3);
                assert_eq!(total_attempts, 3);
                assert_eq!(last_error.kind(), ErrorKind::ExecutionFailed);
            }
            other => panic!("expected retry error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_stops_on_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut notifications = Vec::new();

        let value = RetryExecutor::with_retry_notify(
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 { Err(failing("not yet")) } else { Ok(n) }
                }
            },
            RetryPolicy::new(5, Duration::from_millis(100)),
            |attempt, delay, remaining| notifications.push((attempt, delay, remaining)),
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            notifications,
            vec![
                (1, Duration::from_millis(100), 4),
                (2, Duration::from_millis(100), 3),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_never_notifies_after_last_attempt() {
        let mut notified = 0;
        let _ = RetryExecutor::with_retry_notify(
            || async { Err::<(), _>(failing("always")) },
            RetryPolicy::new(2, Duration::from_millis(10)),
            |_, _, _| notified += 1,
        )
        .await;
        assert_eq!(notified, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_exponential_doubles_delay() {
        let mut delays = Vec::new();
        let started = Instant::now();

        let _ = RetryExecutor::with_retry_notify(
            || async { Err::<(), _>(failing("always")) },
            RetryPolicy::new(4, Duration::from_millis(100)).exponential(true),
            |_, delay, _| delays.push(delay.as_millis() as u64),
        )
        .await;

        assert_eq!(delays, vec![100, 200, 400]);
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_zero_attempts_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = RetryExecutor::with_retry(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(failing("always"))
                }
            },
            RetryPolicy::new(0, Duration::from_millis(10)),
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::Retry);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_gives_each_attempt_a_fresh_timeout() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let option = RetryOption {
            maximum_attempts: 2,
            attempt_delay_ms: 10,
            timeout_ms: Some(100),
            exponential_backoff: false,
        };

        let value = RetryExecutor::execute(
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    // First attempt overruns its window, second finishes in time.
                    let wait = if n == 1 { 150 } else { 90 };
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                    Ok::<_, EngineError>(n)
                }
            },
            &option,
            |_, _, _| {},
        )
        .await
        .unwrap();

        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_reports_timeout_as_last_error() {
        let option = RetryOption {
            maximum_attempts: 2,
            attempt_delay_ms: 10,
            timeout_ms: Some(50),
            exponential_backoff: false,
        };

        let err = RetryExecutor::execute(
            || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, EngineError>(())
            },
            &option,
            |_, _, _| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Retry);
        assert!(err.has_kind(ErrorKind::Timeout));
    }
}
