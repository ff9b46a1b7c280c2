//! Step retry with exponential backoff
//!
//! Only transient failures are retried, and by default only once.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::worker::{FailureKind, StepResult};

/// Retry policy for failed steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (2 = one retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Multiplier for exponential backoff
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Failure kinds that may be retried
    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<FailureKind>,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_retry_on() -> Vec<FailureKind> {
    vec![FailureKind::Timeout, FailureKind::Unavailable]
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            retry_on: default_retry_on(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    #[must_use]
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Set total attempts
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the first backoff delay
    #[must_use]
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff_ms = delay.as_millis() as u64;
        self
    }

    /// Whether a failure on `attempt` (1-based) should be retried
    #[must_use]
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> bool {
        kind.is_transient() && self.retry_on.contains(&kind) && attempt < self.max_attempts
    }

    /// Delay after a failed `attempt` (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Run a step attempt until it succeeds, fails permanently, or attempts run out.
///
/// `attempt_fn` receives the 1-based attempt number. `on_retry` is called
/// before each backoff with the failed attempt, its failure kind and the
/// delay. Returns the last result and the number of attempts made.
pub async fn retry_step<F, Fut, R>(
    policy: &RetryPolicy,
    mut attempt_fn: F,
    mut on_retry: R,
) -> (StepResult, u32)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = StepResult>,
    R: FnMut(u32, FailureKind, Duration),
{
    let mut attempt = 1;
    loop {
        let result = attempt_fn(attempt).await;
        match result.failure_kind() {
            Some(kind) if policy.should_retry(kind, attempt) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    kind = %kind,
                    "Step failed, retrying"
                );
                on_retry(attempt, kind, delay);
                sleep(delay).await;
                attempt += 1;
            }
            _ => {
                if attempt > 1 {
                    debug!(attempt, success = result.is_success(), "Step finished after retry");
                }
                return (result, attempt);
            }
        }
    }
}
