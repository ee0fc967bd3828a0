//! Deadlines and bounded retries around adapter calls.

use crate::provider::ports::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Exponential backoff schedule for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` counts the first try and is at
    /// least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Returns the total number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the retry that follows failed attempt
    /// `attempt` (1-based): `base * 2^(attempt - 1)`, capped.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

/// Deadline and retry settings applied to every adapter call the core makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPolicy {
    timeout: Duration,
    retry: RetryPolicy,
}

impl CallPolicy {
    /// Creates a call policy.
    #[must_use]
    pub const fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    /// Returns the per-attempt deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the retry schedule.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT, RetryPolicy::default())
    }
}

/// Runs `future` under `timeout`, mapping expiry to `Transient(timeout)`.
///
/// # Errors
///
/// Returns the future's own error, or [`ProviderError::Transient`] with kind
/// `timeout` when the deadline elapses first.
pub async fn with_deadline<T, F>(timeout: Duration, operation: &str, future: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    tokio::time::timeout(timeout, future)
        .await
        .unwrap_or_else(|_| {
            Err(ProviderError::timeout(format!(
                "{operation} exceeded its {}ms deadline",
                timeout.as_millis()
            )))
        })
}

/// Calls `call` under the policy's deadline, retrying transient failures.
///
/// Permanent failures return immediately. The last transient failure is
/// returned once attempts are exhausted.
///
/// # Errors
///
/// Returns the [`ProviderError`] of the final attempt.
pub async fn call_with_retry<T, F, Fut>(
    policy: &CallPolicy,
    operation: &str,
    mut call: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 1;
    loop {
        match with_deadline(policy.timeout, operation, call()).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.retry.max_attempts => {
                let delay = policy.retry.backoff(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "retrying transient provider failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
