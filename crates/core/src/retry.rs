use crate::error::UpstreamError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded exponential backoff for calls to rate-limited APIs.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub is_retryable: fn(&UpstreamError) -> bool,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: 2,
            is_retryable: UpstreamError::is_rate_limited,
        }
    }

    /// Embedding a student question: short waits, the request is interactive.
    pub fn for_query() -> Self {
        Self::new(3, Duration::from_secs(2))
    }

    /// Embedding document chunks during ingestion.
    pub fn for_ingestion() -> Self {
        Self::new(5, Duration::from_secs(2))
    }

    /// Answer generation.
    pub fn for_generation() -> Self {
        Self::new(5, Duration::from_secs(10))
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Wait applied after the `failure`-th consecutive retryable failure (0-based).
    pub fn delay_for(&self, failure: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(failure);
        self.base_delay.saturating_mul(factor)
    }

    /// Every wait the policy can apply before giving up.
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|failure| self.delay_for(failure))
            .collect()
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up. Running out of attempts yields
/// [`UpstreamError::Busy`]. The final failed attempt is not followed by a wait.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    service: &'static str,
    mut operation: F,
) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    for attempt in 0..policy.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(service, attempt = attempt + 1, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if (policy.is_retryable)(&error) => {
                if attempt + 1 == policy.max_attempts {
                    warn!(service, attempts = policy.max_attempts, "retries exhausted");
                    break;
                }
                let wait = policy.delay_for(attempt);
                warn!(
                    service,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    "upstream busy, backing off"
                );
                tokio::time::sleep(wait).await;
            }
            Err(error) => return Err(error),
        }
    }

    Err(UpstreamError::Busy {
        service,
        attempts: policy.max_attempts,
    })
}
