use std::{future::Future, time::Duration};

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::{request::AttemptMeta, ApiError};

/// Retry budget and backoff base for one logical request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Policy allowing `attempts` total attempts (at least one).
    pub fn with_max_attempts(attempts: u32, base_delay: Duration) -> Self {
        Self::new(attempts.saturating_sub(1), base_delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff waited before attempt `attempt`: `2^attempt * base_delay`,
    /// zero for the initial attempt. No jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let multiplier = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(multiplier)
    }
}

/// Drives one logical request until success, a non-retryable error, or an
/// exhausted budget.
///
/// Attempts are strictly sequential. Cancellation aborts the in-flight
/// attempt or the pending backoff, and always wins over a late success.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    mut attempt_fn: F,
) -> Result<T, ApiError>
where
    F: FnMut(AttemptMeta) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let cancel = cancel.cloned().unwrap_or_default();
    let mut index = 0u32;
    let mut delay = Duration::ZERO;

    loop {
        if cancel.is_cancelled() {
            return Err(ApiError::cancelled());
        }

        let meta = AttemptMeta {
            index,
            issued_at: Instant::now(),
            delay,
        };
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApiError::cancelled()),
            outcome = attempt_fn(meta) => outcome,
        };
        if cancel.is_cancelled() {
            return Err(ApiError::cancelled());
        }

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() || index >= policy.max_retries {
            return Err(err);
        }

        index += 1;
        delay = policy.delay_for_attempt(index);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            attempt = index,
            kind = ?err.kind,
            status = ?err.http_status,
            "retrying request after {} ms",
            delay.as_millis()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApiError::cancelled()),
            _ = sleep(delay) => {}
        }
    }
}
