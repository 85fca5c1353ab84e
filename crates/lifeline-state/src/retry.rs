// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff for safety-critical remote calls.

use std::future::Future;
use std::time::Duration;

use lifeline_config::model::SyncConfig;
use lifeline_core::LifelineError;
use tracing::{debug, warn};

/// How often and how patiently a remote call is retried before the intent is
/// handed to the offline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.retry_initial_backoff_ms),
            max: Duration::from_millis(config.retry_max_backoff_ms),
            max_attempts: config.retry_max_attempts.max(1),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn single_attempt() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            max_attempts: 1,
        }
    }

    /// Delay before retry number `retry` (1-based): `initial * 2^(retry-1)`,
    /// capped at `max`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted. Returns the last error in the latter cases.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    op: &str,
    mut call: F,
) -> Result<T, LifelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LifelineError>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(op, attempt, "remote call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "remote call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing_test::traced_test;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(350),
            max_attempts: 4,
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(350));
        assert_eq!(p.delay_for(30), Duration::from_millis(350));
    }

    #[test]
    fn config_with_zero_attempts_still_tries_once() {
        let config = SyncConfig {
            retry_max_attempts: 0,
            ..SyncConfig::default()
        };
        assert_eq!(BackoffPolicy::from_config(&config).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_connectivity_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let started = tokio::time::Instant::now();

        let result = retry_with_backoff(&policy(), "test", || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LifelineError::connectivity("down"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(&policy(), "test", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(LifelineError::connectivity("down")) }
        })
        .await;

        assert!(result.unwrap_err().is_connectivity());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(logs_contain("remote call failed, retrying"));
    }

    #[tokio::test]
    async fn non_retryable_errors_return_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(&policy(), "test", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LifelineError::Conflict {
                    message: "stale".into(),
                })
            }
        })
        .await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
