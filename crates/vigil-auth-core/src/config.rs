//! Auth core configuration

use std::time::Duration;

use crate::crypto::HmacKey;
use crate::error::AuthError;

/// Configuration for the authentication core
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for token signing (min 32 bytes)
    pub token_secret: String,
    /// Issuer recorded in tokens
    pub issuer: String,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Issuance epoch bucket width: retried issuance requests landing in the
    /// same bucket derive the same JTI and replay the same token
    pub issue_bucket: Duration,
    /// Lower bound of the comparator jitter window
    pub jitter_min: Duration,
    /// Upper bound of the comparator jitter window
    pub jitter_max: Duration,
    /// Local revocation fallback cache capacity
    pub fallback_cache_capacity: u64,
    /// TTL cap for fallback cache entries (entries also honor their own
    /// valid-until timestamp)
    pub fallback_cache_ttl: Duration,
    /// Retention window for idempotency records
    pub idempotency_retention: Duration,
    /// Age after which a pending idempotency record may be reclaimed
    pub pending_timeout: Duration,
    /// Maximum executions per idempotency key
    pub max_attempts: u32,
    /// Validation attempts allowed per client per minute
    pub rate_limit_per_minute: u32,
}

impl AuthConfig {
    /// Create a configuration with production defaults
    pub fn new(token_secret: impl Into<String>) -> Self {
        Self {
            token_secret: token_secret.into(),
            issuer: "vigil".to_string(),
            access_token_ttl: Duration::from_secs(3600),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 3600),
            issue_bucket: Duration::from_secs(60),
            jitter_min: Duration::from_millis(10),
            jitter_max: Duration::from_millis(20),
            fallback_cache_capacity: 10_000,
            fallback_cache_ttl: Duration::from_secs(24 * 3600),
            idempotency_retention: Duration::from_secs(3600),
            pending_timeout: Duration::from_secs(30),
            max_attempts: 5,
            rate_limit_per_minute: 120,
        }
    }

    /// Override token lifetimes
    #[must_use]
    pub fn with_token_ttls(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_token_ttl = access;
        self.refresh_token_ttl = refresh;
        self
    }

    /// Override the comparator jitter window
    #[must_use]
    pub fn with_jitter_window(mut self, min: Duration, max: Duration) -> Self {
        self.jitter_min = min;
        self.jitter_max = max;
        self
    }

    /// Override the issuance bucket width
    #[must_use]
    pub fn with_issue_bucket(mut self, bucket: Duration) -> Self {
        self.issue_bucket = bucket;
        self
    }

    /// Validate the configuration and build the signing key
    pub fn signing_key(&self) -> Result<HmacKey, AuthError> {
        HmacKey::new(self.token_secret.as_bytes())
            .map_err(|e| AuthError::Configuration(e.to_string()))
    }
}
