//! Retry handler for workflow steps.
//!
//! Stateless: all logic lives in associated functions that take the step's
//! [`RetryPolicy`] as a parameter. Only transient errors are retried, with
//! exponential backoff capped at `max_backoff_ms`.

use std::time::Duration;

use studyflow_types::workflow::RetryPolicy;

use super::step_runner::StepError;

pub struct RetryHandler;

impl RetryHandler {
    /// Whether another attempt should follow a failed one.
    ///
    /// `attempt` is 1-based (first execution is attempt 1). A missing policy
    /// means a single attempt.
    pub fn should_retry(policy: Option<&RetryPolicy>, attempt: u32, error: &StepError) -> bool {
        match policy {
            Some(policy) => error.is_transient() && attempt < policy.max_attempts,
            None => false,
        }
    }

    /// Delay before the attempt that follows `attempt`:
    /// `initial * 2^(attempt - 1)`, capped at `max_backoff_ms`.
    pub fn backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let millis = policy
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(policy.max_backoff_ms);
        Duration::from_millis(millis)
    }
}
