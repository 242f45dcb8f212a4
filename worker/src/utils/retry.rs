//! Async retry with exponential backoff

use std::future::Future;
use std::time::Duration;

/// Default maximum attempts for queue transport calls
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay in milliseconds for exponential backoff
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// Retry an async operation with exponential backoff.
///
/// `is_transient` decides whether a failure is worth another attempt.
/// Returns the first success, or the last error once attempts run out.
pub async fn retry_with_backoff<F, Fut, T, E>(
    max_attempts: u32,
    base_delay_ms: u64,
    is_transient: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempts >= max_attempts.max(1) || !is_transient(&e) {
                    return Err(e);
                }
                let delay = Duration::from_millis(
                    base_delay_ms.saturating_mul(2_u64.saturating_pow(attempts - 1)),
                );
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_on_first_try() {
        let result = retry_with_backoff(3, 1, |_: &&str| true, || async { Ok::<_, &str>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result = retry_with_backoff(
            3,
            1,
            |_: &&str| true,
            || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 1 {
                    Err("transient error")
                } else {
                    Ok(())
                }
            },
        )
        .await;
        assert_eq!(result, Ok(()));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result = retry_with_backoff(
            3,
            1,
            |_: &&str| true,
            || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("persistent error")
            },
        )
        .await;
        assert_eq!(result, Err("persistent error"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result = retry_with_backoff(
            5,
            1,
            |_: &&str| false,
            || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("bad request")
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
