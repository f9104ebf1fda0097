//! Bounded retry with exponential backoff for event store requests
//!
//! Every attempt runs under its own timeout. Only errors classified as
//! retryable are retried; exhausting the budget surfaces
//! `CourtsideError::RetriesExhausted` instead of hanging.

use crate::error::{CourtsideError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Timeout applied to each attempt
    pub attempt_timeout: Duration,
    /// Base delay, doubled after every failed attempt
    pub base_backoff: Duration,
    /// Cap on the delay between attempts
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(10),
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn once(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based), without jitter
    pub fn backoff_duration(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    fn jittered(&self, retry: u32) -> Duration {
        let delay = self.backoff_duration(retry);
        // +-25% so concurrent sessions don't retry in lockstep
        let jitter_range = delay.as_millis() as u64 / 4;
        if jitter_range == 0 {
            return delay;
        }
        let offset = rand::thread_rng().gen_range(0..=jitter_range * 2);
        (delay + Duration::from_millis(offset)).saturating_sub(Duration::from_millis(jitter_range))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let outcome = match timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(CourtsideError::request(
                    None,
                    format!("{operation} timed out after {:?}", self.attempt_timeout),
                )),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    error!("{} failed after {} attempts: {}", operation, attempt, e);
                    return Err(CourtsideError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.jittered(attempt - 1);
                    warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:?}",
                        operation, attempt, max_attempts, e, delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy {
            max_attempts: 5,
            attempt_timeout: Duration::from_secs(1),
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };

        assert_eq!(policy.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_duration(3), Duration::from_millis(500)); // capped
        assert_eq!(policy.backoff_duration(40), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let counter = Arc::clone(&calls);
        let result = policy
            .run("fetch", || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(CourtsideError::request(Some(503), "busy"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let counter = Arc::clone(&calls);
        let err = policy
            .run("delete event", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CourtsideError::request(None, "connection reset"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err,
            CourtsideError::RetriesExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let err = RetryPolicy::default()
            .run("fetch rosters", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CourtsideError::ResourceAbsent("game_rosters".into()))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.is_resource_absent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let policy = RetryPolicy {
            max_attempts: 2,
            attempt_timeout: Duration::from_millis(50),
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
        };

        let err = policy
            .run("slow", || async {
                sleep(Duration::from_secs(60)).await;
                Ok::<_, CourtsideError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CourtsideError::RetriesExhausted { attempts: 2, .. }));
    }
}
