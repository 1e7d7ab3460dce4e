use crate::config::RetryConfig;
use crate::error::{ProviderError, RetryError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::classify::is_retryable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }
}

impl RetryPolicy {
    /// base * 2^(attempt-1), plus optional jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let backoff = self.base_delay.saturating_mul(factor);
        if self.max_jitter.is_zero() {
            return backoff;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.max_jitter.as_millis() as u64);
        backoff + Duration::from_millis(jitter_ms)
    }
}

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// Fatal errors come back unchanged on the attempt they happen. Once retries
/// run out the last error is wrapped with the attempt count. Cancelling the
/// token aborts both an in-flight call and a pending backoff sleep.
pub async fn call_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
            outcome = operation() => outcome,
        };

        match outcome {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => {
                warn!("Attempt {} failed with non-retryable error: {}", attempts, e);
                return Err(RetryError::Fatal(e));
            }
            Err(e) if attempts > policy.max_retries => {
                warn!("All {} attempts failed: {}", attempts, e);
                return Err(RetryError::Exhausted {
                    attempts,
                    source: e,
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempts);
                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, e, delay
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn policy(max_retries: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(base_ms),
            max_jitter: Duration::ZERO,
        }
    }

    fn overloaded() -> ProviderError {
        ProviderError::Http {
            status: 529,
            message: "overloaded".to_string(),
        }
    }

    #[test]
    fn test_delay_doubles() {
        let p = policy(5, 1000);
        assert_eq!(p.delay_for(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2), Duration::from_millis(2000));
        assert_eq!(p.delay_for(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_jitter_is_additive() {
        let p = RetryPolicy {
            max_jitter: Duration::from_millis(50),
            ..policy(2, 100)
        };
        for _ in 0..20 {
            let d = p.delay_for(2);
            assert!(d >= Duration::from_millis(200));
            assert!(d <= Duration::from_millis(250));
        }
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let result = call_with_retry(&policy(2, 10), &CancellationToken::new(), || async {
            Ok::<_, ProviderError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = call_with_retry(&policy(2, 1000), &CancellationToken::new(), || {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(overloaded())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhausts_with_backoff() {
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();

        let result: Result<(), _> =
            call_with_retry(&policy(2, 1000), &CancellationToken::new(), || {
                let calls = calls_clone.clone();
                async move {
                    calls.lock().unwrap().push(Instant::now());
                    Err(ProviderError::Other {
                        message: "Rate limit reached".to_string(),
                        status: None,
                    })
                }
            })
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(source.to_string().contains("Rate limit"));
            }
            other => panic!("unexpected result {:?}", other),
        }

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls[1] - calls[0] >= Duration::from_millis(1000));
        assert!(calls[2] - calls[1] >= Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_fatal_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), _> =
            call_with_retry(&policy(2, 10), &CancellationToken::new(), || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Http {
                        status: 401,
                        message: "invalid x-api-key".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Fatal(ProviderError::Http { status: 401, .. }))
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_backoff_sleep() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let start = Instant::now();

        let result: Result<(), _> = call_with_retry(&policy(2, 10_000), &token, || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(overloaded())
            }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_calls() {
        let token = CancellationToken::new();
        token.cancel();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = call_with_retry(&policy(2, 10), &token, || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ProviderError>(())
            }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
