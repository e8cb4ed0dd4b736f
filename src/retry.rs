use std::future::Future;
use std::time::Duration;

use agent_provider::ProviderError;

/// Attempts per model call, including the first one.
pub const MAX_ATTEMPTS: u32 = 3;
/// Multiplied by `2^(attempt + 1)` when the provider gives no retry hint.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Bounded retry of rate-limited model calls. Every other error passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff_base: BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// Never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the failed 0-based `attempt`: the provider hint, or exponential backoff.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        error.retry_after().unwrap_or_else(|| {
            self.backoff_base
                .saturating_mul(2u32.saturating_pow(attempt.saturating_add(1).min(30)))
        })
    }

    /// Runs `call` until it succeeds, fails with a non-rate-limit error, or
    /// the attempt budget is spent. The last error is returned unmodified.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match call(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_rate_limit() && attempt + 1 < max_attempts => {
                    let delay = self.delay_for(attempt, &error);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "model call rate limited; retrying"
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
    use super::*;

    #[test]
    fn backoff_doubles_from_two_seconds() {
        let policy = RetryPolicy::default();
        let error = ProviderError::rate_limited("429", None);
        assert_eq!(policy.delay_for(0, &error), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1, &error), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2, &error), Duration::from_secs(8));
    }

    #[test]
    fn provider_hint_wins_over_backoff() {
        let policy = RetryPolicy::default();
        let error = ProviderError::rate_limited("429", Some(Duration::from_millis(1500)));
        assert_eq!(policy.delay_for(1, &error), Duration::from_millis(1500));
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let policy = RetryPolicy::default();
        let error = ProviderError::rate_limited("429", None);
        assert!(policy.delay_for(u32::MAX, &error) >= Duration::from_secs(1 << 30));
    }
}
