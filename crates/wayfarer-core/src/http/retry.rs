//! Bounded retry for read calls
//!
//! Listing calls get a single retry after a fixed delay when the failure is
//! transient. Mutations are never retried.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::http::error::ApiError;

/// Retry policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Fixed delay between attempts, in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay_ms: 300,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }

    /// Policy that never retries
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Constant-interval backoff without jitter
    pub fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.delay(),
            current_interval: self.delay(),
            max_interval: self.delay(),
            multiplier: 1.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Decision on whether to retry a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    NoRetry,
}

/// Tracks attempts for one logical call
#[derive(Debug)]
pub struct RetryHandler {
    policy: RetryPolicy,
    attempts: u32,
    backoff: ExponentialBackoff,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        let backoff = policy.create_backoff();
        Self {
            policy,
            attempts: 0,
            backoff,
        }
    }

    /// Only transient kinds are retried, and only up to the policy bound
    pub fn should_retry(&mut self, error: &ApiError) -> RetryDecision {
        if self.attempts >= self.policy.max_retries || !error.kind.is_transient() {
            return RetryDecision::NoRetry;
        }
        self.attempts += 1;
        let delay = self.backoff.next_backoff().unwrap_or_else(|| self.policy.delay());
        RetryDecision::Retry { delay }
    }

    /// Retries made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Run `request_fn` until it succeeds or the policy gives up
pub async fn execute_with_retry<F, Fut, T>(mut request_fn: F, policy: RetryPolicy) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut handler = RetryHandler::new(policy);

    loop {
        match request_fn().await {
            Ok(response) => return Ok(response),
            Err(err) => match handler.should_retry(&err) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        attempt = handler.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::NoRetry => {
                    if err.kind.is_transient() {
                        error!(retries = handler.attempts(), error = %err, "Request failed, giving up");
                    }
                    return Err(err);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy::default().with_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.delay(), Duration::from_millis(300));
    }

    #[test]
    fn test_constant_delay() {
        let mut handler = RetryHandler::new(RetryPolicy::new(3));
        let error = ApiError::from_kind(ErrorKind::BadGateway, Some(502));
        for _ in 0..3 {
            assert_eq!(
                handler.should_retry(&error),
                RetryDecision::Retry {
                    delay: Duration::from_millis(300)
                }
            );
        }
        assert_eq!(handler.should_retry(&error), RetryDecision::NoRetry);
    }

    #[test]
    fn test_non_transient_not_retried() {
        let mut handler = RetryHandler::new(RetryPolicy::default());
        for kind in [ErrorKind::NotFound, ErrorKind::Unauthorized, ErrorKind::ServerError] {
            let error = ApiError::from_kind(kind, None);
            assert_eq!(handler.should_retry(&error), RetryDecision::NoRetry);
        }
        assert_eq!(handler.attempts(), 0);
    }

    #[tokio::test]
    async fn test_single_retry_then_success() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ApiError::from_kind(ErrorKind::ServiceUnavailable, Some(503)))
                } else {
                    Ok("listing")
                }
            },
            fast(),
        )
        .await;
        assert_eq!(result.unwrap(), "listing");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_one_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ApiError> = execute_with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::from_kind(ErrorKind::NetworkUnreachable, Some(0)))
            },
            fast(),
        )
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::NetworkUnreachable);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_policy_single_attempt() {
        let calls = AtomicU32::new(0);
        let _ = execute_with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ApiError::from_kind(ErrorKind::BadGateway, Some(502)))
            },
            RetryPolicy::disabled(),
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
