//! Administrative surface
//!
//! Gated by the `X-Admin-Key` credential, distinct from bearer tokens.
//! Exposes the dead-letter queue, failed idempotency records, manual event
//! resubmission, out-of-band revocation and static API key management.

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vigil_auth_core::idempotency::FailedRecord;
use vigil_events_core::{EventRecord, EventStatus, IngestOutcome};
use vigil_types::{SubjectId, Tier};

use crate::error::{ApiError, ApiResult};
use crate::extractors::AdminKey;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/v1/admin/events/dead-lettered
pub async fn list_dead_lettered(
    _admin: AdminKey,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    let records = state
        .events
        .ledger()
        .list_by_status(EventStatus::DeadLettered, query.limit.min(500))
        .await?;
    Ok(Json(records))
}

/// GET /api/v1/admin/events/due
///
/// Failed events whose next attempt is due; the resubmission scheduler
/// polls this and posts each ID back to the resubmit endpoint.
pub async fn list_due_events(
    _admin: AdminKey,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    let records = state
        .events
        .ledger()
        .list_due(Utc::now(), query.limit.min(500))
        .await?;
    Ok(Json(records))
}

/// POST /api/v1/admin/events/{id}/resubmit
pub async fn resubmit_event(
    _admin: AdminKey,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<IngestOutcome>> {
    let outcome = state.events.resubmit(&event_id).await?;
    metrics::counter!("auth_events_resubmitted_total").increment(1);
    Ok(Json(outcome))
}

/// GET /api/v1/admin/idempotency/failed
pub async fn list_failed_idempotency(
    _admin: AdminKey,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<FailedRecord>>> {
    let records = state
        .auth
        .idempotency()
        .list_failed(query.limit.min(500))
        .await
        .map_err(vigil_auth_core::AuthError::from)?;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
pub struct AdminRevokeRequest {
    pub token_or_jti: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminRevokeResponse {
    pub revoked: bool,
}

/// POST /api/v1/admin/revoke
///
/// Out-of-band revocation of any token or bare JTI.
pub async fn admin_revoke(
    _admin: AdminKey,
    State(state): State<AppState>,
    Json(req): Json<AdminRevokeRequest>,
) -> ApiResult<Json<AdminRevokeResponse>> {
    let reason = req.reason.unwrap_or_else(|| "admin_action".to_string());
    state.auth.revoke(&req.token_or_jti, &reason).await?;
    metrics::counter!("auth_tokens_revoked_total").increment(1);
    Ok(Json(AdminRevokeResponse { revoked: true }))
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub subject: String,
    pub tier: Tier,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    /// Returned exactly once; only a hash is stored
    pub api_key: String,
}

/// POST /api/v1/admin/api-keys
pub async fn create_api_key(
    _admin: AdminKey,
    State(state): State<AppState>,
    Json(req): Json<CreateApiKeyRequest>,
) -> ApiResult<Json<CreateApiKeyResponse>> {
    let subject =
        SubjectId::parse(req.subject).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let api_key = state
        .auth
        .api_keys()
        .create(subject, req.tier, req.scopes, req.name, req.expires_at)
        .await?;

    Ok(Json(CreateApiKeyResponse { api_key }))
}

#[derive(Debug, Deserialize)]
pub struct DeactivateApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct DeactivateApiKeyResponse {
    pub deactivated: bool,
}

/// POST /api/v1/admin/api-keys/deactivate
pub async fn deactivate_api_key(
    _admin: AdminKey,
    State(state): State<AppState>,
    Json(req): Json<DeactivateApiKeyRequest>,
) -> ApiResult<Json<DeactivateApiKeyResponse>> {
    state.auth.api_keys().deactivate(&req.api_key).await?;
    Ok(Json(DeactivateApiKeyResponse { deactivated: true }))
}
