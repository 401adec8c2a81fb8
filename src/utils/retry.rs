use std::{fmt::Display, future::Future, time::Duration};

use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::utils::strip_html;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Multiply the delay by `factor` after each failure, with full jitter.
    Exponential { factor: f64, max_delay_ms: u64 },
    /// Wait `attempt * base_delay` before the next attempt.
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff: Backoff,
}

impl RetryConfig {
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            backoff: Backoff::Linear,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            backoff: Backoff::Exponential {
                factor: 2.0,
                max_delay_ms: max_delay.as_millis() as u64,
            },
        }
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    fn next_delay(&self, attempt: u32, previous_ms: u64) -> u64 {
        match self.backoff {
            Backoff::Linear => self.base_delay_ms.saturating_mul(attempt as u64),
            Backoff::Exponential {
                factor,
                max_delay_ms,
            } => {
                if attempt == 1 {
                    return self.base_delay_ms.min(max_delay_ms);
                }
                // Exponential backoff with full jitter
                // https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/
                let next_delay = previous_ms as f64 * factor;
                std::cmp::min(max_delay_ms, (fastrand::f64() * next_delay) as u64)
            }
        }
    }
}

/// How a single attempt failed.
#[derive(Debug)]
pub enum Failure<E> {
    /// Worth another attempt.
    Transient(E),
    /// Retrying cannot help.
    Permanent(E),
}

#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("permanent failure on attempt {attempts}: {source}")]
    Permanent { attempts: u32, source: E },
    #[error("failed after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_source(self) -> E {
        match self {
            RetryError::Permanent { source, .. } | RetryError::Exhausted { source, .. } => source,
        }
    }
}

pub async fn retry<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    context: &str,
) -> Result<T, RetryError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    let mut delay = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(Failure::Permanent(e)) => {
                error!(
                    "Operation '{}' failed permanently on attempt {}: {}",
                    context,
                    attempt,
                    strip_html(&e.to_string())
                );
                return Err(RetryError::Permanent {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(Failure::Transient(e)) => {
                if attempt >= max_attempts {
                    error!(
                        "Operation '{}' failed after {} attempts. Final error: {}",
                        context,
                        attempt,
                        strip_html(&e.to_string())
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: e,
                    });
                }

                delay = config.next_delay(attempt, delay);
                warn!(
                    "Attempt {}/{} for '{}' failed: {}. Retrying in {}ms...",
                    attempt,
                    max_attempts,
                    context,
                    strip_html(&e.to_string()),
                    delay
                );

                sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };
    use tokio::time::Instant;

    #[test]
    fn linear_delay_grows_by_base_unit() {
        let config = RetryConfig::linear(3, Duration::from_secs(1));
        assert_eq!(config.next_delay(1, 0), 1_000);
        assert_eq!(config.next_delay(2, 1_000), 2_000);
        assert_eq!(config.next_delay(3, 2_000), 3_000);
    }

    #[test]
    fn exponential_delay_never_exceeds_ceiling() {
        let config = RetryConfig::exponential(10, Duration::from_secs(1), Duration::from_secs(4));
        let mut delay = 0;
        for attempt in 1..10 {
            delay = config.next_delay(attempt, delay);
            assert!(delay <= 4_000);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::linear(3, Duration::from_secs(1));
        let started = Instant::now();

        let result: Result<(), _> = retry(
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Failure::Transient("boom"))
                }
            },
            &config,
            "test",
        )
        .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s then 2s between the three attempts
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::linear(3, Duration::from_secs(1));

        let result: Result<(), _> = retry(
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Failure::Permanent("rejected"))
                }
            },
            &config,
            "test",
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.into_source(), "rejected");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::linear(3, Duration::from_millis(10));

        let result = retry(
            || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Failure::Transient("flaky"))
                    } else {
                        Ok(42)
                    }
                }
            },
            &config,
            "test",
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
