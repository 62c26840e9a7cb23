//! Provider webhook handler

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use std::time::Instant;

use vigil_events_core::IngestOutcome;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /webhooks/stripe
///
/// Ingest a signed provider event. Signature verification happens before
/// anything is stored; a processed event redelivered later replays the
/// original outcome with no second side effect. Retryable handler failures
/// surface as 5xx so the provider redelivers.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<IngestOutcome>> {
    let start = Instant::now();

    let Some(sig_header) = headers.get("stripe-signature") else {
        tracing::warn!("Missing Stripe-Signature header");
        return Err(ApiError::BadRequest("missing signature header".to_string()));
    };
    let Ok(signature) = sig_header.to_str() else {
        tracing::warn!("Invalid Stripe-Signature header encoding");
        return Err(ApiError::BadRequest(
            "invalid signature header encoding".to_string(),
        ));
    };

    match state.events.ingest(&body, signature).await {
        Ok(outcome) => {
            metrics::counter!(
                "auth_webhooks_processed_total",
                "status" => outcome.status.to_string()
            )
            .increment(1);
            metrics::histogram!("auth_webhook_duration_seconds")
                .record(start.elapsed().as_secs_f64());

            Ok(Json(outcome))
        }
        Err(e) => {
            metrics::counter!("auth_webhooks_processed_total", "status" => "error").increment(1);
            Err(e.into())
        }
    }
}
