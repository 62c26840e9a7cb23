//! Token issuance, validation and revocation
//!
//! Tokens are HS256 JWTs carrying a deterministic JTI. Issuance is wrapped
//! in the idempotency manager so a retried request replays the original
//! token instead of minting a second live credential. Validation verifies
//! the signature through the timing-safe comparator before trusting any
//! claim, then checks expiry and the revocation store.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vigil_types::{AuthenticatedSubject, CredentialSource, Jti, SubjectId, Tier, TokenUse};

use crate::config::AuthConfig;
use crate::crypto::{HmacKey, TimingSafeComparator};
use crate::error::{AuthError, AuthResult};
use crate::idempotency::{
    DuplicatePolicy, IdempotencyManager, Outcome, derive_jti, fingerprint,
};
use crate::revocation::RevocationStore;

/// Claims carried by a Vigil token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject identifier
    pub sub: String,
    /// Subject tier
    pub tier: Tier,
    /// Granted scopes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Token identifier (revocation lookup key)
    pub jti: Jti,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// access or refresh
    pub token_use: TokenUse,
}

impl TokenClaims {
    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// An issued access/refresh token pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
    pub jti: Jti,
}

/// Token manager: composes the comparator, revocation store and idempotency
/// manager into the issue/validate/revoke lifecycle.
pub struct TokenManager {
    signing_key: HmacKey,
    encoding_key: EncodingKey,
    comparator: TimingSafeComparator,
    revocations: Arc<RevocationStore>,
    idempotency: Arc<IdempotencyManager>,
    config: AuthConfig,
}

impl TokenManager {
    /// Create a token manager.
    ///
    /// Fails if the configured signing secret is too short.
    pub fn new(
        config: AuthConfig,
        revocations: Arc<RevocationStore>,
        idempotency: Arc<IdempotencyManager>,
    ) -> AuthResult<Self> {
        let signing_key = config.signing_key()?;
        let encoding_key = EncodingKey::from_secret(config.token_secret.as_bytes());
        let comparator = TimingSafeComparator::new(config.jitter_min, config.jitter_max);

        Ok(Self {
            signing_key,
            encoding_key,
            comparator,
            revocations,
            idempotency,
            config,
        })
    }

    /// The comparator, shared with sibling verification paths
    pub fn comparator(&self) -> TimingSafeComparator {
        self.comparator.clone()
    }

    // =========================================================================
    // Issuance
    // =========================================================================

    /// Issue an access/refresh token pair for `subject`.
    ///
    /// The JTI is derived deterministically from (subject, claims
    /// fingerprint, issuance bucket), and the whole issuance is wrapped in
    /// the idempotency manager: a retried request inside the same bucket
    /// returns the identical pair.
    pub async fn issue(
        &self,
        subject: &SubjectId,
        tier: Tier,
        scopes: &[String],
    ) -> AuthResult<Outcome<IssuedTokens>> {
        self.issue_with_context(subject, tier, scopes, None).await
    }

    /// Issue with an extra derivation context (used by refresh rotation so
    /// the rotated pair cannot collide with the pair it replaces).
    async fn issue_with_context(
        &self,
        subject: &SubjectId,
        tier: Tier,
        scopes: &[String],
        context: Option<&str>,
    ) -> AuthResult<Outcome<IssuedTokens>> {
        let now = Utc::now();
        let bucket = now
            .timestamp()
            .div_euclid(self.config.issue_bucket.as_secs().max(1) as i64);

        let scope_list = scopes.join(",");
        let tier_str = tier.to_string();
        let mut parts = vec![subject.as_str(), &tier_str, &scope_list];
        if let Some(ctx) = context {
            parts.push(ctx);
        }
        let claims_fp = fingerprint(&parts);

        let jti = derive_jti(subject.as_str(), &claims_fp, bucket);
        let refresh_fp = fingerprint(&[&claims_fp, "refresh"]);
        let refresh_jti = derive_jti(subject.as_str(), &refresh_fp, bucket);

        let bucket_str = bucket.to_string();
        let idem_key = fingerprint(&["issue", subject.as_str(), &claims_fp, &bucket_str]);

        let outcome = self
            .idempotency
            .execute(
                &idem_key,
                DuplicatePolicy::Wait(self.config.pending_timeout),
                true,
                || async {
                    let tokens = self.build_pair(subject, tier, scopes, jti, refresh_jti, now)?;
                    Ok(tokens)
                },
            )
            .await
            .map_err(AuthError::from)?;

        if outcome.replayed {
            tracing::debug!(subject = %subject, jti = %outcome.value.jti, "Replayed issuance");
        } else {
            tracing::info!(subject = %subject, jti = %outcome.value.jti, tier = %tier, "Issued token pair");
        }
        Ok(outcome)
    }

    fn build_pair(
        &self,
        subject: &SubjectId,
        tier: Tier,
        scopes: &[String],
        jti: Jti,
        refresh_jti: Jti,
        now: DateTime<Utc>,
    ) -> Result<IssuedTokens, crate::idempotency::BoxError> {
        let access_exp = now + chrono::TimeDelta::seconds(self.config.access_token_ttl.as_secs() as i64);
        let refresh_exp =
            now + chrono::TimeDelta::seconds(self.config.refresh_token_ttl.as_secs() as i64);

        let access = TokenClaims {
            sub: subject.to_string(),
            tier,
            scopes: scopes.to_vec(),
            jti,
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            iss: self.config.issuer.clone(),
            token_use: TokenUse::Access,
        };
        let refresh = TokenClaims {
            sub: subject.to_string(),
            tier,
            scopes: scopes.to_vec(),
            jti: refresh_jti,
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            iss: self.config.issuer.clone(),
            token_use: TokenUse::Refresh,
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access, &self.encoding_key)?;
        let refresh_token = encode(&header, &refresh, &self.encoding_key)?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.config.access_token_ttl.as_secs(),
            expires_at: access_exp,
            jti,
        })
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate an access token and return the authenticated subject
    pub async fn validate(&self, token: &str) -> AuthResult<AuthenticatedSubject> {
        self.validate_with_use(token, TokenUse::Access).await
    }

    /// Validate a token, requiring a specific declared use.
    ///
    /// Order matters: signature first (through the comparator, jitter on
    /// both outcomes), then claims parsing, then expiry, then revocation.
    pub async fn validate_with_use(
        &self,
        token: &str,
        expected_use: TokenUse,
    ) -> AuthResult<AuthenticatedSubject> {
        let claims = self.verify_signature_and_parse(token).await?;

        if claims.token_use != expected_use {
            return Err(AuthError::Malformed);
        }
        if claims.is_expired() {
            return Err(AuthError::Expired);
        }
        if self.revocations.is_revoked(&claims.jti).await {
            tracing::debug!(jti = %claims.jti, "Rejected revoked token");
            return Err(AuthError::Revoked);
        }

        let subject = SubjectId::parse(&claims.sub).map_err(|_| AuthError::Malformed)?;
        let expires_at = claims.expires_at();
        Ok(AuthenticatedSubject {
            subject,
            tier: claims.tier,
            scopes: claims.scopes,
            source: CredentialSource::Jwt,
            jti: Some(claims.jti),
            expires_at: Some(expires_at),
        })
    }

    /// Verify the compact JWS signature through the timing-safe comparator,
    /// then parse the (now authenticated) claims.
    async fn verify_signature_and_parse(&self, token: &str) -> AuthResult<TokenClaims> {
        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(AuthError::Malformed);
        };

        let header = jsonwebtoken::decode_header(token).map_err(|_| AuthError::Malformed)?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthError::Malformed);
        }

        let presented = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| AuthError::Malformed)?;

        let signing_input = format!("{header_b64}.{payload_b64}");
        let expected = self.signing_key.sign(signing_input.as_bytes());

        if !self.comparator.verify(&expected, &presented).await {
            return Err(AuthError::SignatureMismatch);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::Malformed)?;
        serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)
    }

    // =========================================================================
    // Revocation
    // =========================================================================

    /// Revoke a token (or a bare JTI) with an audit reason.
    ///
    /// Idempotent: revoking an already-revoked or already-expired token is a
    /// no-op, not an error. For a bare JTI the original expiry is unknown,
    /// so the record is held through the maximum token lifetime.
    pub async fn revoke(&self, token_or_jti: &str, reason: &str) -> AuthResult<()> {
        if let Ok(jti) = Jti::parse(token_or_jti) {
            let valid_until = Utc::now()
                + chrono::TimeDelta::seconds(self.config.refresh_token_ttl.as_secs() as i64);
            self.revocations.revoke(&jti, valid_until, None, reason).await;
            return Ok(());
        }

        // Decode claims without signature verification: revocation only
        // needs the JTI and expiry, and rejecting a tampered token here
        // would leave the real one alive.
        let claims = decode_unverified(token_or_jti)?;
        let subject = SubjectId::parse(&claims.sub).ok();
        self.revocations
            .revoke(&claims.jti, claims.expires_at(), subject.as_ref(), reason)
            .await;
        Ok(())
    }

    /// Rotate a refresh token: validate it, revoke it, and issue a fresh
    /// pair derived from the old token's identity.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<Outcome<IssuedTokens>> {
        let authenticated = self
            .validate_with_use(refresh_token, TokenUse::Refresh)
            .await?;

        // The old refresh JTI seeds the new derivation so rotation inside
        // one issuance bucket still produces a distinct pair.
        let old_jti = authenticated
            .jti
            .ok_or_else(|| AuthError::Internal("refresh token without jti".to_string()))?;

        let outcome = self
            .issue_with_context(
                &authenticated.subject,
                authenticated.tier,
                &authenticated.scopes,
                Some(&old_jti.to_string()),
            )
            .await?;

        self.revoke(&old_jti.to_string(), "token_refresh").await?;
        Ok(outcome)
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("issuer", &self.config.issuer)
            .finish_non_exhaustive()
    }
}

/// Parse token claims without verifying the signature
fn decode_unverified(token: &str) -> AuthResult<TokenClaims> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload_b64), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::Malformed);
    };

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)
}
