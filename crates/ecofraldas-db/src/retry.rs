//! # Transaction Retry
//!
//! Re-runs a whole transactional operation when it lost a race.
//!
//! ```text
//! attempt 1 ──► BEGIN … reserve … COMMIT
//!                  │
//!                  ├── Ok                    → return
//!                  ├── non-retryable error   → return it unchanged
//!                  └── Conflict / ConsistencyViolation
//!                          │  (rolled back on drop)
//!                          ▼
//!                      sleep(backoff) ──► attempt 2 … up to max_attempts
//!                                                  │
//!                                                  ▼
//!                                          surface the last error
//! ```
//!
//! Only `DbError::is_retryable()` errors are retried. `InsufficientStock`,
//! `NotFound` and `InvalidState` are final on the first attempt.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::DbResult;

/// How many times, and how patiently, to re-run a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; roughly doubled (with jitter) each
    /// time after.
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Sets the number of attempts (clamped to at least 1).
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        RetryPolicy::default().max_attempts(1)
    }

    /// Delay schedule between attempts. The attempt cap lives in the policy,
    /// so the schedule itself never runs out.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_delay,
            max_interval: self.max_delay,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts.
///
/// `operation` must open and commit its own transaction so that every
/// attempt starts from a fresh snapshot.
pub async fn with_retry<F, Fut, T>(policy: RetryPolicy, op_name: &str, mut operation: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut attempt = 0;
    let mut backoff = policy.create_backoff();

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(op = op_name, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let Some(delay) = backoff.next_backoff() else {
                    return Err(err);
                };
                warn!(
                    op = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Transaction lost a race, retrying"
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use ecofraldas_core::{CoreError, Entity};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_conflict_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(fast(3), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DbError::Conflict("database is locked".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: DbResult<()> = with_retry(fast(5), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DbError::not_found(Entity::Order, "o-1"))
        })
        .await;

        assert!(matches!(
            result,
            Err(DbError::Domain(CoreError::NotFound { entity: Entity::Order, .. }))
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: DbResult<()> = with_retry(fast(3), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DbError::Domain(CoreError::ConsistencyViolation("lost".into())))
        })
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_stays_within_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        };
        let mut backoff = policy.create_backoff();

        for _ in 0..10 {
            let delay = backoff.next_backoff().unwrap();
            // Jitter may push a delay up to 50% past the interval.
            assert!(delay <= Duration::from_millis(60), "delay {:?}", delay);
        }
    }

    #[test]
    fn test_policy_clamps_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts(0).max_attempts, 1);
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }
}
