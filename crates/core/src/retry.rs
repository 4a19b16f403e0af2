//! Bounded retry with doubling backoff.
//!
//! Every provider call in the crate goes through [`RetryPolicy::run`]: a fixed
//! number of attempts, sleeping between failures, with the delay doubling after
//! each failed attempt. Retry state lives on the stack of a single `run` call,
//! so two providers never share a backoff schedule.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::Result;

/// Attempt cap and initial backoff for one provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after every further failure.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Policy with no sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, initial_delay: Duration::ZERO }
    }

    /// The sleeps that separate attempts when every attempt fails.
    ///
    /// Three attempts with a 1s initial delay yield `[1s, 2s]`.
    pub fn delays(&self) -> Vec<Duration> {
        let attempts = self.max_attempts.max(1);
        (0..attempts - 1).map(|i| self.initial_delay * 2u32.saturating_pow(i)).collect()
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Errors are logged under
    /// `label` and never escape; exhaustion is reported as `None`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut delay = self.initial_delay;

        for attempt in 1..=attempts {
            match op(attempt).await {
                Ok(value) => return Some(value),
                Err(e) => {
                    warn!(provider = label, attempt, error = %e, "attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        warn!(provider = label, attempts, "failed to get a valid response after maximum retries");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrecisError;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn failure() -> PrecisError {
        PrecisError::BadResponse { provider: "test".to_string(), reason: "always fails".to_string() }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.delays(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert!(RetryPolicy::immediate(0).delays().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_op_sleeps_one_then_two_seconds() {
        let start = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let result: Option<()> = RetryPolicy::default()
            .run("test", |_| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(start.elapsed());
                    Err(failure())
                }
            })
            .await;

        assert!(result.is_none());
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(3)]);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_stops_retrying() {
        let start = Instant::now();
        let mut calls = 0;

        let result = RetryPolicy::default()
            .run("test", |attempt| {
                calls += 1;
                async move { if attempt == 2 { Ok("done") } else { Err(failure()) } }
            })
            .await;

        assert_eq!(result, Some("done"));
        assert_eq!(calls, 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_first_attempt_success_does_not_sleep() {
        let result = RetryPolicy::default().run("test", |_| async { Ok(7) }).await;
        assert_eq!(result, Some(7));
    }
}
