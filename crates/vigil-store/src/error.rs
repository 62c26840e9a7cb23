//! Store errors

use thiserror::Error;

/// Errors from the shared state backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend unreachable, timed out, or refused the operation
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be interpreted
    #[error("corrupt record at {key}: {detail}")]
    Corrupt { key: String, detail: String },
}

impl StoreError {
    /// Whether the error indicates the backend itself is down (as opposed to
    /// a bad record), which is what drives degraded-mode fallback.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
