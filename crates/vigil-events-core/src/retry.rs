//! Retry backoff as pure state transitions
//!
//! No in-process sleeping: a failure produces the next [`RetryState`] (or a
//! dead-letter verdict) and an external scheduler resubmits due events, so
//! the schedule survives process restarts.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::EventConfig;
use crate::event::RetryState;

/// Exponential backoff with a ceiling and a dead-letter cap
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    ceiling: Duration,
    max_retries: u32,
}

/// Outcome of recording one more failure
#[derive(Debug, Clone)]
pub enum FailureTransition {
    /// Retry later, with the updated state
    Scheduled(RetryState),
    /// Retry budget spent; the event is terminal
    DeadLetter(RetryState),
}

impl BackoffPolicy {
    pub fn new(config: &EventConfig) -> Self {
        Self {
            base: config.backoff_base,
            ceiling: config.backoff_ceiling,
            max_retries: config.max_retries.max(1),
        }
    }

    /// Maximum handler executions before dead-lettering
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before attempt `attempts + 1`: `base * 2^(attempts-1)`, capped
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let shift = attempts.saturating_sub(1).min(32);
        let delay = self.base.saturating_mul(1u32.checked_shl(shift).unwrap_or(u32::MAX));
        delay.min(self.ceiling)
    }

    /// Fold one more failure into the retry state
    pub fn on_failure(
        &self,
        prior: &RetryState,
        error: &str,
        now: DateTime<Utc>,
    ) -> FailureTransition {
        let attempts = prior.attempts + 1;
        let last_error = Some(error.to_string());

        if attempts >= self.max_retries {
            return FailureTransition::DeadLetter(RetryState {
                attempts,
                next_attempt_at: None,
                last_error,
            });
        }

        let delay = self.delay_for(attempts);
        FailureTransition::Scheduled(RetryState {
            attempts,
            next_attempt_at: Some(now + chrono::TimeDelta::seconds(delay.as_secs() as i64)),
            last_error,
        })
    }
}
