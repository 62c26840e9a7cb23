//! Event processing errors

use thiserror::Error;
use vigil_auth_core::idempotency::IdempotencyError;
use vigil_store::StoreError;

/// Event processing errors
#[derive(Error, Debug)]
pub enum EventError {
    /// Signature header missing, malformed, stale, or mismatched.
    /// Forged events are rejected before any record is created.
    #[error("webhook signature verification failed")]
    SignatureMismatch,

    /// Payload is not a well-formed event envelope
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    /// No record exists for the requested event
    #[error("unknown event: {event_id}")]
    UnknownEvent { event_id: String },

    /// The handler failed; the event is scheduled for retry
    #[error("handler failed for event {event_id}: {message}")]
    Handler { event_id: String, message: String },

    /// The event exhausted its retry budget. Surfaced on the administrative
    /// boundary only; the original sender sees an acknowledgement.
    #[error("event {event_id} is dead-lettered")]
    DeadLettered { event_id: String },

    /// A duplicate delivery is in flight
    #[error("event {event_id} is already being processed")]
    Conflict { event_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SignatureMismatch | Self::MalformedPayload(_) => 400,
            Self::UnknownEvent { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Handler { .. } | Self::DeadLettered { .. } | Self::Serialization(_) => 500,
            Self::Store(_) => 503,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Self::UnknownEvent { .. } => "UNKNOWN_EVENT",
            Self::Handler { .. } => "HANDLER_FAILED",
            Self::DeadLettered { .. } => "DEAD_LETTERED",
            Self::Conflict { .. } => "CONFLICT",
            Self::Store(_) => "STORE_UNAVAILABLE",
            Self::Serialization(_) => "INTERNAL_ERROR",
        }
    }
}

/// Map idempotency-layer errors into event terms
pub(crate) fn from_idempotency(event_id: &str, err: IdempotencyError) -> EventError {
    match err {
        IdempotencyError::Store(e) => EventError::Store(e),
        IdempotencyError::Conflict { .. } => EventError::Conflict {
            event_id: event_id.to_string(),
        },
        IdempotencyError::AttemptsExhausted { attempts, .. } => {
            tracing::warn!(event_id, attempts, "Idempotency retry budget exhausted");
            EventError::DeadLettered {
                event_id: event_id.to_string(),
            }
        }
        IdempotencyError::Operation { message } => EventError::Handler {
            event_id: event_id.to_string(),
            message,
        },
        IdempotencyError::Serialization(e) => EventError::Serialization(e),
    }
}

/// Result alias for event operations
pub type EventResult<T> = Result<T, EventError>;
