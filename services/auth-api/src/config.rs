//! Configuration for the Auth API service.

use std::time::Duration;

use vigil_auth_core::AuthConfig;
use vigil_events_core::EventConfig;

/// Auth API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,
    /// Shared backend connection target
    pub redis_url: String,
    /// Per-operation backend timeout
    pub backend_op_timeout: Duration,
    /// Administrative credential (distinct from bearer tokens)
    pub admin_key: String,
    /// Auth core configuration
    pub auth: AuthConfig,
    /// Event processing configuration
    pub events: EventConfig,
    /// Request timeout
    pub request_timeout: Duration,
    /// Metrics enabled
    pub metrics_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let redis_url =
            std::env::var("REDIS_URL").map_err(|_| ConfigError::Missing("REDIS_URL"))?;

        let http_port = std::env::var("HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("HTTP_PORT"))?;

        let token_secret =
            std::env::var("TOKEN_SECRET").map_err(|_| ConfigError::Missing("TOKEN_SECRET"))?;

        let webhook_secret = std::env::var("WEBHOOK_SIGNING_SECRET")
            .map_err(|_| ConfigError::Missing("WEBHOOK_SIGNING_SECRET"))?;

        let admin_key =
            std::env::var("ADMIN_KEY").map_err(|_| ConfigError::Missing("ADMIN_KEY"))?;
        if admin_key.len() < 32 {
            return Err(ConfigError::Invalid("ADMIN_KEY"));
        }

        let backend_op_timeout =
            Duration::from_millis(env_parse("BACKEND_OP_TIMEOUT_MS", 2_000)?);

        // Auth core knobs
        let mut auth = AuthConfig::new(token_secret)
            .with_token_ttls(
                Duration::from_secs(env_parse("ACCESS_TOKEN_TTL_SECS", 3_600)?),
                Duration::from_secs(env_parse("REFRESH_TOKEN_TTL_SECS", 30 * 24 * 3_600)?),
            )
            .with_jitter_window(
                Duration::from_millis(env_parse("JITTER_MIN_MS", 10)?),
                Duration::from_millis(env_parse("JITTER_MAX_MS", 20)?),
            )
            .with_issue_bucket(Duration::from_secs(env_parse("TOKEN_ISSUE_BUCKET_SECS", 60)?));
        auth.fallback_cache_capacity = env_parse("FALLBACK_CACHE_SIZE", 10_000)?;
        auth.fallback_cache_ttl =
            Duration::from_secs(env_parse("FALLBACK_CACHE_TTL_SECS", 24 * 3_600)?);
        auth.idempotency_retention =
            Duration::from_secs(env_parse("IDEMPOTENCY_RETENTION_SECS", 3_600)?);
        auth.pending_timeout =
            Duration::from_secs(env_parse("IDEMPOTENCY_PENDING_TIMEOUT_SECS", 30)?);
        auth.max_attempts = env_parse("IDEMPOTENCY_MAX_ATTEMPTS", 5)?;
        auth.rate_limit_per_minute = env_parse("RATE_LIMIT_PER_MINUTE", 120)?;

        // Event processing knobs
        let events = EventConfig::new(webhook_secret).with_retry(
            env_parse("WEBHOOK_MAX_RETRIES", 5)?,
            Duration::from_secs(env_parse("WEBHOOK_BACKOFF_BASE_SECS", 30)?),
            Duration::from_secs(env_parse("WEBHOOK_BACKOFF_CEILING_SECS", 3_600)?),
        );

        let request_timeout = Duration::from_secs(env_parse("REQUEST_TIMEOUT_SECS", 30)?);

        let metrics_enabled = std::env::var("METRICS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(Self {
            http_port,
            redis_url,
            backend_op_timeout,
            admin_key,
            auth,
            events,
            request_timeout,
            metrics_enabled,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
