//! Auth errors
//!
//! Validation failures keep their specific kind all the way to the caller so
//! API consumers can distinguish "expired" from "revoked" from "malformed".
//! Infrastructure failures are absorbed by degraded-mode fallbacks where one
//! exists; `StoreUnavailable` surfaces only when no safe fallback answer
//! exists, and is never silently treated as valid or invalid.

use thiserror::Error;
use vigil_store::StoreError;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Token is structurally invalid (not a token at all)
    #[error("malformed token")]
    Malformed,

    /// Token signature does not verify
    #[error("token signature mismatch")]
    SignatureMismatch,

    /// Token has expired
    #[error("token expired")]
    Expired,

    /// Token has been revoked
    #[error("token revoked")]
    Revoked,

    /// Static API key is unknown, inactive, or expired
    #[error("invalid API key")]
    InvalidApiKey,

    /// Validity cannot be confirmed: backend down and no fallback answer
    #[error("cannot verify: shared store unavailable")]
    StoreUnavailable,

    /// A duplicate of this operation is already in flight
    #[error("operation already in progress: {key}")]
    Conflict { key: String },

    /// Retry budget for an idempotent operation is exhausted
    #[error("operation failed after {attempts} attempts")]
    AttemptsExhausted { attempts: u32 },

    /// Too many validation attempts from this caller
    #[error("rate limit exceeded")]
    RateLimited,

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Malformed => 400,
            Self::SignatureMismatch | Self::Expired | Self::Revoked | Self::InvalidApiKey => 401,
            Self::Conflict { .. } => 409,
            Self::RateLimited => 429,
            Self::StoreUnavailable => 503,
            Self::AttemptsExhausted { .. } | Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed => "MALFORMED",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::Conflict { .. } => "CONFLICT",
            Self::AttemptsExhausted { .. } => "ATTEMPTS_EXHAUSTED",
            Self::RateLimited => "RATE_LIMIT_EXCEEDED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this is a client-caused validation failure (4xx-equivalent)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Malformed
                | Self::SignatureMismatch
                | Self::Expired
                | Self::Revoked
                | Self::InvalidApiKey
        )
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => Self::StoreUnavailable,
            StoreError::Corrupt { key, detail } => {
                tracing::error!(key = %key, detail = %detail, "Corrupt backend record");
                Self::Internal(format!("corrupt record at {key}"))
            }
        }
    }
}

/// Result alias for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_kinds_are_distinct() {
        // Every validation failure keeps its own code; none collapse together
        let kinds = [
            AuthError::Malformed,
            AuthError::SignatureMismatch,
            AuthError::Expired,
            AuthError::Revoked,
            AuthError::InvalidApiKey,
        ];
        let codes: std::collections::HashSet<_> =
            kinds.iter().map(|e| e.error_code()).collect();
        assert_eq!(codes.len(), kinds.len());
        assert!(kinds.iter().all(AuthError::is_validation));
    }

    #[test]
    fn test_store_unavailable_is_not_a_validation_error() {
        let err = AuthError::from(StoreError::Unavailable("down".into()));
        assert!(!err.is_validation());
        assert_eq!(err.status_code(), 503);
    }
}
