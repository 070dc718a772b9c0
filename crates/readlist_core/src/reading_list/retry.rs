use crate::errors::ClientError;
use core::future::Future;
use core::time::Duration;
use log::warn;
use tokio::time::{sleep, timeout};

/// Bounded retry for transient-prone calls: linear backoff, per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay × n`
    pub base_delay: Duration,
    /// Upper bound on a single attempt; an elapsed attempt counts as transient
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(800),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    #[inline]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    #[must_use]
    #[inline]
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }
}

/// Runs `operation` until it succeeds, fails non-transiently, or the retry budget is spent.
/// # Errors
/// Returns the last error once attempts are exhausted, or the first non-transient error.
#[allow(clippy::missing_inline_in_public_items, reason = "Generic, called rarely")]
pub async fn retry_transient<T, Operation, Fut>(
    policy: &RetryPolicy,
    mut operation: Operation,
) -> Result<T, ClientError>
where
    Operation: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut retry: u32 = 0;
    loop {
        let outcome = match timeout(policy.attempt_timeout, operation()).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(ClientError::Transient(format!(
                "request cancelled after {}ms",
                policy.attempt_timeout.as_millis()
            ))),
        };

        match outcome {
            Err(error) if error.is_transient() && retry < policy.max_retries => {
                retry = retry.saturating_add(1);
                let delay = policy.backoff(retry);
                warn!(
                    "Attempt {retry}/{} failed ({error}), retrying in {}ms",
                    policy.max_attempts(),
                    delay.as_millis()
                );
                sleep(delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts_with_linear_backoff() {
        let attempts = Cell::new(0_u32);
        let started = Instant::now();
        let result: Result<(), ClientError> = retry_transient(&RetryPolicy::default(), || {
            attempts.set(attempts.get() + 1);
            async { Err(ClientError::Transient(String::from("503"))) }
        })
        .await;

        assert!(matches!(result, Err(ClientError::Transient(_))));
        assert_eq!(attempts.get(), 3);
        // 800ms before the first retry, 1600ms before the second
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(2400), "waited {waited:?}");
        assert!(waited < Duration::from_millis(3200), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_when_a_retry_succeeds() {
        let attempts = Cell::new(0_u32);
        let result = retry_transient(&RetryPolicy::default(), || {
            attempts.set(attempts.get() + 1);
            let attempt = attempts.get();
            async move {
                if attempt < 2 {
                    Err(ClientError::Transient(String::from("timeout")))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_other_failures() {
        let attempts = Cell::new(0_u32);
        let result: Result<(), ClientError> = retry_transient(&RetryPolicy::default(), || {
            attempts.set(attempts.get() + 1);
            async { Err(ClientError::NotFound(String::from("gone"))) }
        })
        .await;
        assert!(matches!(result, Err(ClientError::NotFound(_))));
        assert_eq!(attempts.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out_as_transient() {
        let attempts = Cell::new(0_u32);
        let policy = RetryPolicy {
            max_retries: 1,
            ..RetryPolicy::default()
        };
        let result: Result<(), ClientError> = retry_transient(&policy, || {
            attempts.set(attempts.get() + 1);
            async {
                sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        })
        .await;
        assert!(matches!(result, Err(ClientError::Transient(_))));
        assert_eq!(attempts.get(), 2);
    }
}
