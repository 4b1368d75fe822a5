// Retry policy shared by the orchestrator and the segment fetcher.
//
// Exponential backoff with an optional jitter component and a hard delay cap.

use crate::error::AcquireError;
use rand::RngExt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Backoff configuration injected wherever a loop may repeat a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the initial attempt).
    pub max_retries: u32,
    /// Base delay between retries. Actual delay = base * 2^attempt + jitter.
    pub base_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// When true, adds random jitter of [0, base_delay/2).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_retries` times without sleeping.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Total attempts allowed, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (0-indexed): `base * 2^attempt`
    /// capped at `max_delay`, plus jitter that never pushes it past the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        backoff + self.jitter_within(self.max_delay.saturating_sub(backoff))
    }

    fn jitter_within(&self, headroom: Duration) -> Duration {
        if !self.jitter {
            return Duration::ZERO;
        }
        let limit = u64::try_from((self.base_delay / 2).min(headroom).as_millis()).unwrap_or(u64::MAX);
        if limit == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..limit))
    }
}

/// Sleep for `delay` unless `token` fires first.
pub async fn pause(delay: Duration, token: &CancellationToken) -> Result<(), AcquireError> {
    if delay.is_zero() {
        return if token.is_cancelled() {
            Err(AcquireError::Cancelled)
        } else {
            Ok(())
        };
    }
    tokio::select! {
        _ = token.cancelled() => Err(AcquireError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed with a retryable error (network, 5xx, timeout).
    Retry(AcquireError),
    /// Operation failed with a non-retryable error (4xx, parse error).
    Fail(AcquireError),
}

/// Execute an async operation with retry-and-backoff.
///
/// The `operation` closure receives the current attempt number (0-indexed) and
/// returns a [`RetryAction`]. Cancellation is checked before every attempt and
/// while sleeping.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, AcquireError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }

        match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                pause(delay, token).await?;
                attempt += 1;
            }
        }
    }
}
