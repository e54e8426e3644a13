use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use boardsight_core::{ModelError, SourceError};
use tracing::warn;

/// Errors the retry loop can classify and synthesize on timeout.
pub trait Retryable: Display {
    fn is_retryable(&self) -> bool;
    fn timed_out(after: Duration) -> Self;
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        SourceError::is_retryable(self)
    }

    fn timed_out(after: Duration) -> Self {
        SourceError::Timeout(after.as_secs())
    }
}

impl Retryable for ModelError {
    fn is_retryable(&self) -> bool {
        true
    }

    fn timed_out(after: Duration) -> Self {
        ModelError::Timeout(after.as_secs())
    }
}

/// Bounded exponential backoff with a per-attempt timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            timeout: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, timeout: Duration) -> Self {
        Self { max_retries, base_delay_ms, timeout, ..Self::default() }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Runs one call under the policy timeout.
    pub async fn attempt<T, E, Fut>(&self, call: Fut) -> Result<T, E>
    where
        E: Retryable,
        Fut: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(E::timed_out(self.timeout)),
        }
    }

    /// Retries retryable failures up to `max_retries` times, sleeping between attempts.
    pub async fn retry<T, E, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match self.attempt(call()).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        event_name = "retry.scheduled",
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "call failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use boardsight_core::{BoardId, SourceError};

    use super::BackoffPolicy;

    fn fast(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy::new(max_retries, 1, Duration::from_millis(200))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay_ms: 250,
            max_delay_ms: 1_000,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(4), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(60), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn retryable_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let outcome = fast(2)
            .retry("fetch_items", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SourceError::RateLimited("429".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(outcome, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_boards_are_not_retried() {
        let calls = AtomicU32::new(0);
        let outcome: Result<(), SourceError> = fast(3)
            .retry("fetch_items", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::BoardNotFound(BoardId::from("9")))
            })
            .await;
        assert!(matches!(outcome, Err(SourceError::BoardNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out_as_recoverable_errors() {
        let policy = BackoffPolicy::new(1, 1, Duration::from_millis(20));
        let calls = AtomicU32::new(0);
        let outcome: Result<(), SourceError> = policy
            .retry("fetch_items", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(outcome, Err(SourceError::Timeout(0)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
