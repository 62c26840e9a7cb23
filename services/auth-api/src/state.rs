//! Application state for the Auth API service.

use std::sync::Arc;

use async_trait::async_trait;
use vigil_auth_core::AuthService;
use vigil_auth_core::idempotency::BoxError;
use vigil_events_core::{EventEnvelope, EventHandler, EventProcessor, HandlerRegistry};
use vigil_store::KeyValueStore;

use crate::config::Config;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Authentication service (tokens, revocation, API keys)
    pub auth: Arc<AuthService>,
    /// Webhook event processor
    pub events: Arc<EventProcessor>,
    /// Shared backend handle (readiness probe)
    pub backend: Arc<dyn KeyValueStore>,
    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire up services over the shared backend
    pub fn new(config: Config, backend: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let auth = Arc::new(AuthService::new(config.auth.clone(), Arc::clone(&backend))?);

        let registry = billing_registry();
        let events = EventProcessor::new(
            config.events.clone(),
            Arc::clone(&backend),
            auth.idempotency(),
            auth.tokens().comparator(),
            registry,
        )
        .map_err(|e| anyhow::anyhow!("event processor setup failed: {e}"))?;

        Ok(Self {
            auth,
            events: Arc::new(events),
            backend,
            config: Arc::new(config),
        })
    }

    /// Get request timeout from config
    pub fn request_timeout(&self) -> std::time::Duration {
        self.config.request_timeout
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

/// Billing provider event types this service consumes.
///
/// The handlers are the boundary to the subscription system: they record the
/// event for downstream consumers and surface it in metrics. Interpreting
/// the payload beyond its declared type happens outside this service.
fn billing_registry() -> HandlerRegistry {
    let subscription: Arc<dyn EventHandler> = Arc::new(SubscriptionEventHandler);
    let invoice: Arc<dyn EventHandler> = Arc::new(InvoiceEventHandler);

    HandlerRegistry::builder()
        .register("customer.subscription.created", Arc::clone(&subscription))
        .register("customer.subscription.updated", Arc::clone(&subscription))
        .register("customer.subscription.deleted", Arc::clone(&subscription))
        .register("invoice.payment_succeeded", Arc::clone(&invoice))
        .register("invoice.payment_failed", Arc::clone(&invoice))
        .build()
        .expect("registry has handlers for every consumed event type")
}

struct SubscriptionEventHandler;

#[async_trait]
impl EventHandler for SubscriptionEventHandler {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), BoxError> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Applying subscription lifecycle event"
        );
        metrics::counter!("auth_subscription_events_total", "type" => event.event_type.clone())
            .increment(1);
        Ok(())
    }
}

struct InvoiceEventHandler;

#[async_trait]
impl EventHandler for InvoiceEventHandler {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), BoxError> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Applying invoice payment event"
        );
        metrics::counter!("auth_invoice_events_total", "type" => event.event_type.clone())
            .increment(1);
        Ok(())
    }
}
