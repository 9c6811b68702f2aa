//! Exponential backoff for retryable failures.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::batch::options::RateLimitOptions;
use crate::error::Result;

/// `min(base * 2^(attempt-1), max)` for the 1-based `attempt`.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

/// Run `f` until it succeeds, fails with a non-retryable error, or retries
/// run out.
///
/// Returns `None` if `cancel` has fired before an attempt or fires while
/// waiting between attempts.
pub async fn retry_with_backoff<T, F, Fut>(
    item: &str,
    policy: &RateLimitOptions,
    cancel: &CancellationToken,
    mut f: F,
) -> Option<Result<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let base = Duration::from_millis(policy.base_delay_ms);
    let max = Duration::from_millis(policy.max_delay_ms);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return None;
        }
        let result = f().await;
        let err = match result {
            Err(e) if e.is_retryable() && attempt < policy.max_retries => e,
            done => return Some(done),
        };
        attempt += 1;
        let delay = backoff_delay(attempt, base, max);
        warn!(
            item,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Retrying after backoff"
        );
        tokio::select! {
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_then_caps() {
        let base = Duration::from_millis(1_000);
        let max = Duration::from_millis(30_000);
        assert_eq!(backoff_delay(1, base, max), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(2, base, max), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(3, base, max), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(6, base, max), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(64, base, max), max);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = tokio::time::Instant::now();
        let result = retry_with_backoff("wi_a", &RateLimitOptions::default(), &CancellationToken::new(), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Transient("502".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap().unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Option<Result<()>> =
            retry_with_backoff("wi_a", &RateLimitOptions::default(), &CancellationToken::new(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Timeout {
                    operation: "get_item".into(),
                    after_ms: 10,
                })
            })
            .await;
        assert!(result.unwrap().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Option<Result<()>> =
            retry_with_backoff("wi_a", &RateLimitOptions::default(), &CancellationToken::new(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Validation("title required".into()))
            })
            .await;
        assert!(matches!(result, Some(Err(Error::Validation(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            trigger.cancel();
        });
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Option<Result<()>> =
            retry_with_backoff("wi_a", &RateLimitOptions::default(), &cancel, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Transient("reset".into()))
            })
            .await;
        assert!(result.is_none());
        // attempts at 0s and 1s; cancelled during the 2s backoff
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_skips_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Option<Result<()>> =
            retry_with_backoff("wi_a", &RateLimitOptions::default(), &cancel, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
