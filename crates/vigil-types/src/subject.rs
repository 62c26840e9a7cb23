//! Subject and token identifiers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subject identifier (the principal a token is issued for)
///
/// Subjects are opaque strings assigned by the upstream identity system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Maximum accepted length in bytes
    pub const MAX_LENGTH: usize = 128;

    /// Parse a subject identifier, rejecting empty or oversized values
    pub fn parse(s: impl Into<String>) -> Result<Self, SubjectIdError> {
        let s = s.into();
        if s.is_empty() {
            return Err(SubjectIdError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(SubjectIdError::TooLong { actual: s.len() });
        }
        Ok(Self(s))
    }

    /// The underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors parsing a subject identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubjectIdError {
    #[error("subject identifier is empty")]
    Empty,

    #[error("subject identifier too long: {actual} bytes (max {})", SubjectId::MAX_LENGTH)]
    TooLong { actual: usize },
}

/// Token identifier (JWT `jti` claim)
///
/// Derived deterministically at issuance (UUIDv5 over a fixed namespace),
/// used as the revocation lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jti(pub Uuid);

impl Jti {
    /// Parse a JTI from its string form
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for Jti {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for Jti {
    fn from(u: Uuid) -> Self {
        Self(u)
    }
}
