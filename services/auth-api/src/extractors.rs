//! Axum extractors for authentication

use axum::Json;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::net::SocketAddr;

use vigil_types::AuthenticatedSubject;

use crate::state::AppState;

/// Authenticated caller extracted from the `Authorization: Bearer` header.
///
/// Accepts both JWTs and legacy static API keys transparently.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedSubject);

/// Error response for auth failures
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: AuthErrorDetail,
}

#[derive(Debug, Serialize)]
struct AuthErrorDetail {
    code: String,
    message: String,
}

/// Auth rejection type
pub struct AuthRejection {
    status: StatusCode,
    code: String,
    message: String,
}

impl AuthRejection {
    fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = AuthErrorResponse {
            error: AuthErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = extract_bearer(parts)?;
        let client_key = client_key(parts);

        let subject = app_state
            .auth
            .validate_bearer(&token, &client_key)
            .await
            .map_err(|e| {
                tracing::debug!(error = ?e, "Bearer validation failed");
                AuthRejection::new(
                    StatusCode::from_u16(e.status_code())
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    e.error_code(),
                    &e.to_string(),
                )
            })?;

        Ok(AuthUser(subject))
    }
}

/// Extract the bearer token from the Authorization header
fn extract_bearer(parts: &Parts) -> Result<String, AuthRejection> {
    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Err(AuthRejection::new(
            StatusCode::UNAUTHORIZED,
            "MISSING_TOKEN",
            "No authentication token provided",
        ));
    };

    let auth_str = auth_header.to_str().map_err(|_| {
        AuthRejection::new(
            StatusCode::BAD_REQUEST,
            "INVALID_HEADER",
            "Invalid Authorization header encoding",
        )
    })?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(AuthRejection::new(
            StatusCode::UNAUTHORIZED,
            "MISSING_TOKEN",
            "Expected Authorization: Bearer <token>",
        )),
    }
}

/// Rate-limit key for the caller: the peer IP when known
pub fn client_key(parts: &Parts) -> String {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Marker extractor for the administrative surface.
///
/// Requires the `X-Admin-Key` header to match the configured administrative
/// credential; comparison runs through the timing-safe comparator.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

impl<S> FromRequestParts<S> for AdminKey
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let presented = parts
            .headers
            .get("x-admin-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let comparator = app_state.auth.tokens().comparator();
        let matches = comparator
            .verify(
                presented.as_bytes(),
                app_state.config.admin_key.as_bytes(),
            )
            .await;

        if !matches {
            tracing::warn!("Rejected administrative request with bad credential");
            return Err(AuthRejection::new(
                StatusCode::UNAUTHORIZED,
                "ADMIN_REQUIRED",
                "Valid X-Admin-Key header required",
            ));
        }

        Ok(AdminKey)
    }
}
