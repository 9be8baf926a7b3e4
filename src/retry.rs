// Retry and backoff policy for UltiBust
// Pure decision logic, no I/O: the executor asks what to do after every attempt

use std::time::Duration;

use crate::models::ProbeOutcome;

/// Largest retry budget a policy accepts.
pub const MAX_RETRIES: u32 = u32::MAX - 1;

/// What the executor should do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GiveUp,
    RetryImmediately,
    RetryAfter(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_sleep: Duration,
    pub backoff_increment: Duration,
    pub throttle_code: u16,
}

impl RetryPolicy {
    /// Negative retry counts are treated as zero retries. The upper clamp keeps
    /// the 1-based attempt number representable on the final attempt.
    pub fn new(max_retries: i64, base_sleep: Duration, backoff_increment: Duration, throttle_code: u16) -> Self {
        Self {
            max_retries: max_retries.clamp(0, i64::from(MAX_RETRIES)) as u32,
            base_sleep,
            backoff_increment,
            throttle_code,
        }
    }

    /// Upper bound on attempts for a single probe.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether the outcome would be retried if budget remained.
    pub fn is_retryable(&self, outcome: &ProbeOutcome) -> bool {
        match outcome {
            ProbeOutcome::TransportFailure { .. } | ProbeOutcome::Throttled { .. } => true,
            ProbeOutcome::Success { status_code, .. } => *status_code == self.throttle_code,
        }
    }

    /// Linear backoff: attempt 1 waits `base_sleep`, each later attempt adds one increment.
    pub fn backoff(&self, attempt_number: u32) -> Duration {
        let steps = attempt_number.saturating_sub(1);
        self.base_sleep
            .saturating_add(self.backoff_increment.saturating_mul(steps))
    }

    /// `attempt_number` is 1-based.
    pub fn decide(&self, outcome: &ProbeOutcome, attempt_number: u32) -> Action {
        let budget_left = attempt_number <= self.max_retries;
        match outcome {
            ProbeOutcome::TransportFailure { .. } if budget_left => Action::RetryImmediately,
            _ if budget_left && self.is_retryable(outcome) => Action::RetryAfter(self.backoff(attempt_number)),
            _ => Action::GiveUp,
        }
    }
}

/// Free-function form of [`RetryPolicy::decide`].
pub fn decide(outcome: &ProbeOutcome, attempt_number: u32, policy: &RetryPolicy) -> Action {
    policy.decide(outcome, attempt_number)
}
