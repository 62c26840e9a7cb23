//! Token lifecycle handlers

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vigil_types::{Jti, SubjectId, Tier};

use crate::error::{ApiError, ApiResult};
use crate::extractors::{AdminKey, AuthUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub subject: String,
    pub tier: Tier,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct IssueResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
    pub jti: Jti,
    /// True when a retried request replayed the original issuance
    pub replayed: bool,
}

/// POST /api/v1/auth/token
///
/// Issue an access/refresh pair. Issuance sits behind the administrative
/// credential: account authentication happens upstream, and this surface is
/// called by trusted services on a subject's behalf.
pub async fn issue_token(
    _admin: AdminKey,
    State(state): State<AppState>,
    Json(req): Json<IssueRequest>,
) -> ApiResult<Json<IssueResponse>> {
    let subject =
        SubjectId::parse(req.subject).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = state.auth.issue(&subject, req.tier, &req.scopes).await?;

    metrics::counter!("auth_tokens_issued_total", "replayed" => outcome.replayed.to_string())
        .increment(1);

    let tokens = outcome.value;
    Ok(Json(IssueResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: tokens.token_type,
        expires_in: tokens.expires_in,
        expires_at: tokens.expires_at,
        jti: tokens.jti,
        replayed: outcome.replayed,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /api/v1/auth/token/refresh
///
/// Rotate a refresh token: the old one is revoked, a fresh pair returned.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<IssueResponse>> {
    let outcome = state.auth.refresh(&req.refresh_token).await?;

    metrics::counter!("auth_tokens_refreshed_total").increment(1);

    let tokens = outcome.value;
    Ok(Json(IssueResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: tokens.token_type,
        expires_in: tokens.expires_in,
        expires_at: tokens.expires_at,
        jti: tokens.jti,
        replayed: outcome.replayed,
    }))
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub subject: String,
    pub tier: Tier,
    pub scopes: Vec<String>,
    pub source: vigil_types::CredentialSource,
    pub jti: Option<Jti>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<AuthUser> for ValidateResponse {
    fn from(user: AuthUser) -> Self {
        let s = user.0;
        Self {
            subject: s.subject.to_string(),
            tier: s.tier,
            scopes: s.scopes,
            source: s.source,
            jti: s.jti,
            expires_at: s.expires_at,
        }
    }
}

/// POST /api/v1/auth/validate
///
/// Validate the presented bearer credential and return the authenticated
/// subject. Failures carry their specific kind (expired, revoked,
/// malformed, signature mismatch, store unavailable).
pub async fn validate_token(user: AuthUser) -> Json<ValidateResponse> {
    metrics::counter!("auth_tokens_validated_total").increment(1);
    Json(ValidateResponse::from(user))
}

/// GET /api/v1/auth/me
///
/// The authenticated subject behind the presented credential.
pub async fn me(user: AuthUser) -> Json<ValidateResponse> {
    Json(ValidateResponse::from(user))
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
    pub jti: Option<Jti>,
}

/// POST /api/v1/auth/revoke
///
/// Revoke the presented bearer token (logout semantics). Revoking an
/// already-revoked token succeeds; the operation is idempotent.
pub async fn revoke_token(
    user: AuthUser,
    State(state): State<AppState>,
    parts: Option<Json<RevokeRequest>>,
) -> ApiResult<Json<RevokeResponse>> {
    let reason = parts
        .and_then(|Json(r)| r.reason)
        .unwrap_or_else(|| "user_logout".to_string());

    let Some(jti) = user.0.jti else {
        // Static API keys are deactivated on the admin surface, not revoked
        return Err(ApiError::BadRequest(
            "presented credential is not a revocable token".to_string(),
        ));
    };

    state.auth.revoke(&jti.to_string(), &reason).await?;
    metrics::counter!("auth_tokens_revoked_total").increment(1);

    Ok(Json(RevokeResponse {
        revoked: true,
        jti: Some(jti),
    }))
}
