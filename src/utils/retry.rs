//! Retry of transient HTTP failures inside one fetch attempt
//!
//! An adapter may issue a few requests per attempt. Requests that fail with a
//! recoverable [`FetchError`] (connect errors, 429, 5xx, proxy hiccups) are
//! repeated with exponential delay. The budget stays small: the whole attempt
//! runs under the scheduler's deadline, and a failed attempt is already
//! retried on the next due time.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::FetchError;

/// Retry policy for requests made by the built-in adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra requests after the first one
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_delays(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            ..Self::default()
        }
    }

    /// Single request, no retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based)
    fn delay_before(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let grown = self.base_delay_ms as f64 * self.backoff_multiplier.powi(retry as i32 - 1);
        Duration::from_millis((grown as u64).min(self.max_delay_ms))
    }
}

/// Run `request` until it succeeds, fails permanently, or the budget is spent
///
/// Only errors for which [`FetchError::is_recoverable`] holds are retried.
///
/// ```no_run
/// use newsloom::utils::error::FetchError;
/// use newsloom::utils::retry::{retry_transient, RetryConfig};
///
/// # async fn run() -> Result<(), FetchError> {
/// let _body = retry_transient(&RetryConfig::default(), "https://example.com/feed", || async {
///     Ok::<_, FetchError>(b"<rss/>".to_vec())
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_transient<T, F, Fut>(
    config: &RetryConfig,
    url: &str,
    request: F,
) -> Result<T, FetchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut retry = 0;

    loop {
        if retry > 0 {
            let delay = config.delay_before(retry);
            debug!(url = %url, retry, delay_ms = delay.as_millis() as u64, "Retrying request");
            tokio::time::sleep(delay).await;
        }

        let err = match request().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_recoverable() {
            return Err(err);
        }
        if retry >= config.max_retries {
            warn!(url = %url, retries = retry, error = %err, "Giving up on request");
            return Err(err);
        }

        debug!(url = %url, retry, error = %err, "Transient request failure");
        retry += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const URL: &str = "https://example.com/feed.xml";

    #[tokio::test]
    async fn test_first_success_is_returned() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_transient(&RetryConfig::with_delays(3, 1, 5), URL, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FetchError>(7)
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_transient(&RetryConfig::with_delays(3, 1, 5), URL, move || async move {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(FetchError::Status(503)),
                1 => Err(FetchError::Status(429)),
                _ => Ok("body"),
            }
        })
        .await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_transient(&RetryConfig::with_delays(3, 1, 5), URL, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status(404))
        })
        .await;

        assert!(matches!(result, Err(FetchError::Status(404))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_transient(&RetryConfig::with_delays(2, 1, 5), URL, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status(502))
        })
        .await;

        assert!(matches!(result, Err(FetchError::Status(502))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disabled_makes_one_request() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _ = retry_transient(&RetryConfig::disabled(), URL, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(FetchError::Timeout(100))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let config = RetryConfig::with_delays(5, 200, 1_000);

        assert_eq!(config.delay_before(0), Duration::ZERO);
        assert_eq!(config.delay_before(1), Duration::from_millis(200));
        assert_eq!(config.delay_before(2), Duration::from_millis(400));
        assert_eq!(config.delay_before(3), Duration::from_millis(800));
        assert_eq!(config.delay_before(4), Duration::from_millis(1_000));
    }
}
