//! Authenticated-subject output shared by all credential paths

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Jti, SubjectId, Tier};

/// Which credential kind produced an authenticated subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Signed bearer token (JWT)
    Jwt,
    /// Legacy static API key
    ApiKey,
}

/// Token use declared in the `token_use` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    /// Short-lived access token
    Access,
    /// Long-lived refresh token
    Refresh,
}

impl std::fmt::Display for TokenUse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// The output of successful credential validation
///
/// Both the JWT path and the legacy static-key path converge on this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedSubject {
    /// The subject the credential was issued for
    pub subject: SubjectId,
    /// Subject's tier
    pub tier: Tier,
    /// Scopes granted to the credential
    pub scopes: Vec<String>,
    /// Which credential kind was presented
    pub source: CredentialSource,
    /// Token identifier (JWT path only)
    pub jti: Option<Jti>,
    /// Credential expiry (static keys may never expire)
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthenticatedSubject {
    /// Check whether a scope was granted (a `*` scope grants everything)
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope || s == "*")
    }
}
