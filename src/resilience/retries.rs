//! Retry policy for upstream attempts.
//!
//! # Responsibilities
//! - Classify each attempt's outcome
//! - Bound the number of attempts
//! - Compute the delay before the next attempt
//!
//! # Design Decisions
//! - 2xx stops immediately; 4xx other than 429 is the client's problem and
//!   is never retried
//! - 5xx, 429 and transport errors are transient
//! - Anything else (1xx, 3xx) is returned as-is

use std::time::Duration;
use axum::http::StatusCode;

use crate::config::RetryConfig;
use crate::resilience::backoff::linear_backoff;

/// What to do after one upstream attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    ClientError,
    Retryable,
    Terminal,
}

/// Classify an attempt by its status, `None` meaning a transport error or timeout.
pub fn classify(status: Option<StatusCode>) -> AttemptOutcome {
    match status {
        None => AttemptOutcome::Retryable,
        Some(s) if s.is_success() => AttemptOutcome::Success,
        Some(StatusCode::TOO_MANY_REQUESTS) => AttemptOutcome::Retryable,
        Some(s) if s.is_client_error() => AttemptOutcome::ClientError,
        Some(s) if s.is_server_error() => AttemptOutcome::Retryable,
        Some(_) => AttemptOutcome::Terminal,
    }
}

/// Attempt budget and backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_jitter,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_jitter_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `attempt` (0-based) is the last one allowed.
    pub fn is_last(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_attempts
    }

    /// Delay to wait after a failed `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        linear_backoff(attempt, self.base_delay, self.max_jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
