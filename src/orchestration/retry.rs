//! Retry policy for handler invocations.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configures retries of a failing handler within one dispatch.
///
/// The default performs no retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra invocations after the first failure.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Total invocations allowed for one dispatch.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(compute_backoff(self, attempt))
    }
}

/// Cancellation is final; every other failure may be retried.
pub fn is_retryable(err: &Error) -> bool {
    !matches!(err, Error::Cancelled)
}

/// Exponential backoff `base * 2^attempt`, capped at `backoff_max_ms`.
fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}
