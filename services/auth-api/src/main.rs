//! Vigil Auth API
//!
//! Authentication and webhook-ingestion service.
//!
//! ## REST Endpoints
//!
//! - `POST /api/v1/auth/token` - Issue a token pair (admin credential)
//! - `POST /api/v1/auth/token/refresh` - Rotate a refresh token
//! - `POST /api/v1/auth/validate` - Validate a bearer credential
//! - `GET /api/v1/auth/me` - Authenticated subject
//! - `POST /api/v1/auth/revoke` - Revoke the presented token
//! - `POST /webhooks/stripe` - Signed provider webhook ingestion
//!
//! ## Administrative surface (X-Admin-Key)
//!
//! - `GET /api/v1/admin/events/dead-lettered`
//! - `GET /api/v1/admin/events/due`
//! - `POST /api/v1/admin/events/{id}/resubmit`
//! - `GET /api/v1/admin/idempotency/failed`
//! - `POST /api/v1/admin/revoke`
//! - `POST /api/v1/admin/api-keys` / `POST /api/v1/admin/api-keys/deactivate`
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe (backend connectivity)
//! - `GET /status` - Component health and rolling statistics
//! - `GET /metrics` - Prometheus metrics

mod config;
mod error;
mod extractors;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::routing::{get, post};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vigil_store::RedisStore;

use crate::config::Config;
use crate::handlers::{health, ready, status};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("auth_api=debug".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vigil Auth API");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(http_port = config.http_port, "Configuration loaded");

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };

    // Connect to the shared state backend
    let backend = Arc::new(
        RedisStore::connect_with_timeout(&config.redis_url, config.backend_op_timeout).await?,
    );
    tracing::info!("Shared state backend connected");

    // Wire up application state
    let state = AppState::new(config.clone(), backend)?;

    // Build HTTP router and serve
    let app = build_router(state.clone(), metrics_handle);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    run_http_server(app, addr).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.request_timeout();

    // API v1 auth routes
    let api_v1 = Router::new()
        .route("/auth/token", post(handlers::issue_token))
        .route("/auth/token/refresh", post(handlers::refresh_token))
        .route("/auth/validate", post(handlers::validate_token))
        .route("/auth/me", get(handlers::me))
        .route("/auth/revoke", post(handlers::revoke_token))
        // Administrative surface
        .route(
            "/admin/events/dead-lettered",
            get(handlers::list_dead_lettered),
        )
        .route("/admin/events/due", get(handlers::list_due_events))
        .route(
            "/admin/events/{id}/resubmit",
            post(handlers::resubmit_event),
        )
        .route(
            "/admin/idempotency/failed",
            get(handlers::list_failed_idempotency),
        )
        .route("/admin/revoke", post(handlers::admin_revoke))
        .route("/admin/api-keys", post(handlers::create_api_key))
        .route(
            "/admin/api-keys/deactivate",
            post(handlers::deactivate_api_key),
        );

    // Webhook route (separate - uses raw body, no JSON parsing)
    let webhook_routes = Router::new().route("/webhooks/stripe", post(handlers::stripe_webhook));

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/status", get(status));

    // Metrics route (no timeout)
    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Build middleware stack (order matters - outermost first)
    let middleware = ServiceBuilder::new()
        // Request ID propagation (outermost)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        // Tracing with request details
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // Request timeout (innermost - closest to handler)
        .layer(TimeoutLayer::new(request_timeout));

    // Combine all routes
    Router::new()
        .nest("/api/v1", api_v1)
        .merge(webhook_routes)
        .layer(middleware)
        .merge(health_routes) // Health routes without timeout
        .merge(metrics_route) // Metrics route without timeout
        .with_state(state)
}

async fn run_http_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let service: IntoMakeServiceWithConnectInfo<Router, SocketAddr> =
        app.into_make_service_with_connect_info();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("auth_tokens_issued_total", "Total token pairs issued");
    metrics::describe_counter!("auth_tokens_refreshed_total", "Total refresh rotations");
    metrics::describe_counter!("auth_tokens_validated_total", "Total successful validations");
    metrics::describe_counter!("auth_tokens_revoked_total", "Total revocations");
    metrics::describe_counter!(
        "auth_webhooks_processed_total",
        "Total webhooks processed by status"
    );
    metrics::describe_counter!(
        "auth_events_resubmitted_total",
        "Total manual event resubmissions"
    );
    metrics::describe_counter!(
        "auth_subscription_events_total",
        "Subscription lifecycle events applied"
    );
    metrics::describe_counter!(
        "auth_invoice_events_total",
        "Invoice payment events applied"
    );
    metrics::describe_histogram!(
        "auth_webhook_duration_seconds",
        "Webhook ingestion latency in seconds"
    );

    Ok(handle)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
