//! The unit of work a saga is made of.

use std::time::Duration;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::StepError;

/// A step with a forward action and an optional compensating action.
///
/// `T` is the business entity carried by the [`ExecutionContext`].
///
/// Both actions must be idempotent: `forward` may be retried under the
/// step's [`RetryPolicy`], and calling `compensate` twice must leave the
/// same state as calling it once. The executor only calls `compensate`
/// after `forward` returned `Ok`; the step can read its own forward result
/// with `ctx.result(self.name())`.
#[async_trait]
pub trait Step<T>: Send + Sync
where
    T: Send + Sync,
{
    /// Name of the step, unique within its saga definition.
    fn name(&self) -> &str;

    /// Performs the action and returns a value for later steps.
    async fn forward(&self, ctx: &ExecutionContext<T>) -> Result<serde_json::Value, StepError>;

    /// Undoes a successful `forward`. Defaults to a no-op for read-only steps.
    async fn compensate(&self, ctx: &ExecutionContext<T>) -> Result<(), StepError> {
        let _ = ctx;
        Ok(())
    }

    /// Retry budget for transient forward failures.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    /// Conditional steps return false to be skipped. Skipped steps are
    /// neither recorded as completed nor compensated.
    fn should_run(&self, ctx: &ExecutionContext<T>) -> bool {
        let _ = ctx;
        true
    }
}

/// Exponential backoff policy for transient forward failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of forward attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// A single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Three attempts: 100ms, then 200ms between them, capped at 2s.
    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Returns true if another attempt is allowed after `attempt` (1-indexed) failed.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_backoff.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.allows_retry(1));
    }

    #[test]
    fn test_standard_policy_caps_at_three_attempts() {
        let policy = RetryPolicy::standard();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy::standard();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::standard().with_max_backoff(Duration::from_millis(150));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(150));
    }

    #[test]
    fn test_max_attempts_never_drops_below_one() {
        let policy = RetryPolicy::standard().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }
}
