//! Bounded retry for operations that fail transiently.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Attempt ceiling and backoff for [`with_retry`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// How a failed attempt should be handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    /// The failure was caused by our own cancellation: stop, silently.
    Cancelled,
    /// Try again if attempts remain.
    Transient,
    /// Retrying cannot help.
    Fatal,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    Cancelled,
    Exhausted { attempts: u32, last: E },
    Fatal(E),
}

/// Run `op` until it succeeds, `classify` says to stop, or the policy's
/// attempt ceiling is reached. `op` receives the 1-based attempt number.
pub async fn with_retry<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    classify: C,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Failure,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        match classify(&err) {
            Failure::Cancelled => {
                debug!(attempt, error = %err, "attempt ended by cancellation");
                return Err(RetryError::Cancelled);
            }
            Failure::Fatal => {
                warn!(attempt, error = %err, "attempt failed, not retryable");
                return Err(RetryError::Fatal(err));
            }
            Failure::Transient if attempt >= max_attempts => {
                warn!(attempt, error = %err, "attempt failed, retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
            Failure::Transient => {
                let delay = policy.delay_after(attempt);
                warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(2), Duration::from_millis(200));
        assert_eq!(p.delay_after(3), Duration::from_millis(350));
        assert_eq!(p.delay_after(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<u32, RetryError<String>> = with_retry(
            &fast(5),
            |_| Failure::Transient,
            |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err(format!("boom {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let result: Result<(), RetryError<String>> = with_retry(
            &fast(3),
            |_| Failure::Transient,
            |attempt| async move { Err(format!("boom {attempt}")) },
        )
        .await;
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: "boom 3".into()
            })
        );
    }

    #[tokio::test]
    async fn cancellation_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), RetryError<String>> = with_retry(
            &fast(10),
            |e: &String| {
                if e == "cancelled" {
                    Failure::Cancelled
                } else {
                    Failure::Transient
                }
            },
            |_| {
                calls.set(calls.get() + 1);
                async { Err("cancelled".to_string()) }
            },
        )
        .await;
        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn fatal_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), RetryError<String>> = with_retry(
            &fast(10),
            |_| Failure::Fatal,
            |_| {
                calls.set(calls.get() + 1);
                async { Err("corrupt".to_string()) }
            },
        )
        .await;
        assert_eq!(result, Err(RetryError::Fatal("corrupt".into())));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = Cell::new(0);
        let _: Result<(), RetryError<String>> = with_retry(
            &fast(0),
            |_| Failure::Transient,
            |_| {
                calls.set(calls.get() + 1);
                async { Err("x".to_string()) }
            },
        )
        .await;
        assert_eq!(calls.get(), 1);
    }
}
