//! Event processing configuration

use std::time::Duration;

/// Configuration for the event processor
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Shared secret for provider signature verification
    pub signing_secret: String,
    /// Accepted clock skew on the signature timestamp
    pub timestamp_tolerance: Duration,
    /// Handler failures tolerated before an event dead-letters
    pub max_retries: u32,
    /// First retry delay; doubles per attempt
    pub backoff_base: Duration,
    /// Upper bound on any retry delay
    pub backoff_ceiling: Duration,
    /// How long event records are kept in the backend
    pub retention: Duration,
    /// How long a duplicate delivery waits for an in-flight twin
    pub duplicate_wait: Duration,
    /// Rolling window for the statistics surface
    pub stats_window: Duration,
}

impl EventConfig {
    /// Create a configuration with production defaults
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            timestamp_tolerance: Duration::from_secs(300),
            max_retries: 5,
            backoff_base: Duration::from_secs(30),
            backoff_ceiling: Duration::from_secs(3600),
            retention: Duration::from_secs(7 * 24 * 3600),
            duplicate_wait: Duration::from_secs(10),
            stats_window: Duration::from_secs(3600),
        }
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, base: Duration, ceiling: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff_base = base;
        self.backoff_ceiling = ceiling;
        self
    }
}
