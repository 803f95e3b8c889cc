//! Bounded retry with linear backoff for page fetches.
//!
//! The policy is a plain value so callers decide what to wrap. Only
//! transient failures (timeouts, refused connections, 429, 5xx) are retried;
//! everything else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::ScraperError;

/// Returns `true` if `err` represents a transient condition that should be
/// retried after a backoff delay.
fn is_retriable(err: &ScraperError) -> bool {
    match err {
        ScraperError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        ScraperError::RateLimited { .. } => true,
        ScraperError::UnexpectedStatus { status, .. } => *status >= 500,
        ScraperError::InvalidUrl { .. } | ScraperError::InvalidRange { .. } => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay unit; the wait before retry `n` (1-based) is `backoff_base * n`.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(retry)
    }

    /// Runs `operation` until it succeeds, fails non-transiently, or the retry
    /// ceiling is reached. With `max_retries = 3` the operation runs at most
    /// four times.
    ///
    /// # Errors
    ///
    /// Returns the last error seen.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ScraperError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScraperError>>,
    {
        let mut retry = 0u32;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !is_retriable(&err) || retry >= self.max_retries {
                return Err(err);
            }

            retry += 1;
            let delay = self.delay_for(retry);
            tracing::warn!(
                retry,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient fetch error, retrying after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn server_error() -> ScraperError {
        ScraperError::UnexpectedStatus {
            status: 503,
            url: "https://www.kvd.se/auktioner/x-1".to_owned(),
        }
    }

    #[test]
    fn request_build_errors_are_not_retriable() {
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .expect_err("relative URL should not build");
        assert!(!is_retriable(&ScraperError::Http(err)));
    }

    #[tokio::test]
    async fn refused_connections_are_retriable() {
        // Bind then drop to get a local port with nothing listening.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("ephemeral port")
            .port();
        let err = reqwest::get(format!("http://127.0.0.1:{port}/"))
            .await
            .expect_err("nothing is listening");
        assert!(is_retriable(&ScraperError::Http(err)));
    }

    #[test]
    fn delay_grows_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_immediately_on_first_try() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let result = policy
            .run(|| {
                let cc = Arc::clone(&cc);
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, ScraperError>(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_linear_backoff_then_succeeds() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        let result = policy
            .run(|| {
                let cc = Arc::clone(&cc);
                async move {
                    let n = cc.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(server_error())
                    } else {
                        Ok::<u32, ScraperError>(7)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        // 5s before the first retry, 10s before the second.
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16),
            "unexpected backoff total: {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_retry_ceiling() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let policy = RetryPolicy::new(2, Duration::from_secs(1));
        let result = policy
            .run(|| {
                let cc = Arc::clone(&cc);
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, ScraperError>(ScraperError::RateLimited {
                        url: "https://www.kvd.se".to_owned(),
                        retry_after_secs: 0,
                    })
                }
            })
            .await;
        // max_retries=2 → 3 total attempts
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ScraperError::RateLimited { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_client_errors() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let result = policy
            .run(|| {
                let cc = Arc::clone(&cc);
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, ScraperError>(ScraperError::UnexpectedStatus {
                        status: 404,
                        url: "https://www.kvd.se/auktioner/gone-1".to_owned(),
                    })
                }
            })
            .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ScraperError::UnexpectedStatus { status: 404, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_runs_once() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let policy = RetryPolicy::new(0, Duration::from_secs(5));
        let result = policy
            .run(|| {
                let cc = Arc::clone(&cc);
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, ScraperError>(server_error())
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
