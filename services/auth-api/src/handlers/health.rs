//! Health and observability handlers

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use vigil_auth_core::SecurityStats;
use vigil_auth_core::revocation::RevocationHealth;
use vigil_events_core::EventCounts;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub backend: &'static str,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub revocation: RevocationHealth,
    pub security: SecurityStats,
    pub events: EventCounts,
}

/// GET /health - liveness probe, always answers while the process runs
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /ready - readiness probe, checks shared backend connectivity
pub async fn ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, StatusCode> {
    match state.backend.ping().await {
        Ok(()) => Ok(Json(ReadyResponse {
            status: "ready",
            backend: "connected",
        })),
        Err(e) => {
            tracing::error!(error = ?e, "Backend readiness check failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// GET /status
///
/// Full component health for the monitoring boundary: backend availability,
/// revocation backend in use, security statistics, rolling event counts.
/// The service stays "degraded" rather than unhealthy during an outage
/// because validation continues on the local fallback.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let revocation = state.auth.revocation_health().await;
    let status = if revocation.available {
        "healthy"
    } else {
        "degraded"
    };

    Json(StatusResponse {
        status,
        revocation,
        security: state.auth.security_stats(),
        events: state.events.stats(),
    })
}
