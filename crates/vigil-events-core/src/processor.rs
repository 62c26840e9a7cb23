//! Idempotent webhook event processing
//!
//! Receipt pipeline: signature verification (forged deliveries leave no
//! trace) -> envelope parse -> ledger record -> idempotent handler dispatch
//! keyed on the external event ID -> status transition. Handlers are looked
//! up in a closed registry validated at startup, so unknown event types are
//! acknowledged predictably instead of retried.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vigil_auth_core::crypto::TimingSafeComparator;
use vigil_auth_core::idempotency::{BoxError, DuplicatePolicy, IdempotencyManager, fingerprint};
use vigil_store::KeyValueStore;

use crate::config::EventConfig;
use crate::error::{EventError, EventResult, from_idempotency};
use crate::event::{EventLedger, EventRecord, EventStatus};
use crate::retry::{BackoffPolicy, FailureTransition};
use crate::signature::SignatureVerifier;
use crate::stats::{EventCounts, RollingStats};

/// Parsed event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Externally-assigned event ID (the idempotency key source)
    pub id: String,
    /// Declared event type, used for handler routing
    #[serde(rename = "type")]
    pub event_type: String,
    /// Provider-side creation time (unix seconds)
    #[serde(default)]
    pub created: i64,
    /// Type-specific payload, passed through to the handler uninterpreted
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A side-effect handler for one event type
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), BoxError>;
}

/// Closed event-type registry, validated at startup
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder {
            handlers: HashMap::new(),
        }
    }

    fn handler_for(&self, event_type: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(event_type)
    }

    /// Registered event types
    pub fn event_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("event_types", &self.handlers.len())
            .finish()
    }
}

/// Builder for [`HandlerRegistry`]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register a handler for `event_type`
    #[must_use]
    pub fn register(mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(event_type.into(), handler);
        self
    }

    /// Validate and build the registry.
    ///
    /// An empty registry is a deployment mistake and fails startup.
    pub fn build(self) -> EventResult<HandlerRegistry> {
        if self.handlers.is_empty() {
            return Err(EventError::MalformedPayload(
                "handler registry is empty".to_string(),
            ));
        }
        Ok(HandlerRegistry {
            handlers: self.handlers,
        })
    }
}

/// Result of one delivery or resubmission
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub event_id: String,
    pub status: EventStatus,
    /// Whether a prior execution's outcome was replayed (no new side effect)
    pub replayed: bool,
}

/// Webhook event processor
pub struct EventProcessor {
    verifier: SignatureVerifier,
    ledger: EventLedger,
    idempotency: Arc<IdempotencyManager>,
    registry: HandlerRegistry,
    backoff: BackoffPolicy,
    stats: RollingStats,
    duplicate_wait: Duration,
}

impl EventProcessor {
    /// Create a processor over the shared backend.
    ///
    /// Fails if the signing secret is too short or the registry is empty.
    pub fn new(
        config: EventConfig,
        backend: Arc<dyn KeyValueStore>,
        idempotency: Arc<IdempotencyManager>,
        comparator: TimingSafeComparator,
        registry: HandlerRegistry,
    ) -> EventResult<Self> {
        let verifier = SignatureVerifier::new(&config, comparator)?;
        let ledger = EventLedger::new(backend, config.retention);
        let backoff = BackoffPolicy::new(&config);
        let stats = RollingStats::new(config.stats_window);

        Ok(Self {
            verifier,
            ledger,
            idempotency,
            registry,
            backoff,
            stats,
            duplicate_wait: config.duplicate_wait,
        })
    }

    /// Ingest one signed delivery.
    ///
    /// Forged deliveries are rejected before any record is created.
    /// Redelivery of a processed event replays the original outcome with
    /// zero additional side effects.
    pub async fn ingest(&self, payload: &[u8], signature_header: &str) -> EventResult<IngestOutcome> {
        self.verifier.verify(payload, signature_header).await?;

        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| EventError::MalformedPayload(e.to_string()))?;
        let envelope: EventEnvelope = serde_json::from_value(value.clone())
            .map_err(|e| EventError::MalformedPayload(e.to_string()))?;
        if envelope.id.is_empty() || envelope.event_type.is_empty() {
            return Err(EventError::MalformedPayload(
                "event id and type are required".to_string(),
            ));
        }

        let record = match self.ledger.get(&envelope.id).await? {
            Some(record) => match record.status {
                EventStatus::Processed => {
                    tracing::info!(event_id = %record.event_id, "Duplicate delivery of processed event");
                    return Ok(IngestOutcome {
                        event_id: record.event_id,
                        status: EventStatus::Processed,
                        replayed: true,
                    });
                }
                EventStatus::DeadLettered => {
                    // Acknowledged so the provider stops redelivering; the
                    // event stays parked for manual intervention
                    return Ok(IngestOutcome {
                        event_id: record.event_id,
                        status: EventStatus::DeadLettered,
                        replayed: true,
                    });
                }
                _ => record,
            },
            None => {
                let record =
                    EventRecord::received(envelope.id.clone(), envelope.event_type.clone(), value);
                self.ledger.put(&record).await?;
                self.stats.record(EventStatus::Received);
                tracing::info!(event_id = %record.event_id, event_type = %record.event_type, "Received webhook event");
                record
            }
        };

        self.dispatch(record, &envelope).await
    }

    /// Resubmit a previously failed event.
    ///
    /// Entry point for the external retry scheduler and the administrative
    /// surface. Dead-lettered events are refused; dueness is the scheduler's
    /// concern (see [`EventLedger::list_due`]).
    pub async fn resubmit(&self, event_id: &str) -> EventResult<IngestOutcome> {
        let record = self
            .ledger
            .get(event_id)
            .await?
            .ok_or_else(|| EventError::UnknownEvent {
                event_id: event_id.to_string(),
            })?;

        match record.status {
            EventStatus::Processed => Ok(IngestOutcome {
                event_id: record.event_id,
                status: EventStatus::Processed,
                replayed: true,
            }),
            EventStatus::DeadLettered => Err(EventError::DeadLettered {
                event_id: record.event_id,
            }),
            _ => {
                let envelope: EventEnvelope = serde_json::from_value(record.payload.clone())
                    .map_err(|e| EventError::MalformedPayload(e.to_string()))?;
                self.dispatch(record, &envelope).await
            }
        }
    }

    async fn dispatch(
        &self,
        mut record: EventRecord,
        envelope: &EventEnvelope,
    ) -> EventResult<IngestOutcome> {
        let Some(handler) = self.registry.handler_for(&envelope.event_type) else {
            // Unknown types are acknowledged, never retried
            tracing::warn!(event_id = %record.event_id, event_type = %envelope.event_type, "No handler for event type");
            record.status = EventStatus::Processed;
            record.processed_at = Some(Utc::now());
            self.ledger.put(&record).await?;
            self.stats.record(EventStatus::Processed);
            return Ok(IngestOutcome {
                event_id: record.event_id,
                status: EventStatus::Processed,
                replayed: false,
            });
        };

        record.status = EventStatus::Processing;
        self.ledger.put(&record).await?;
        self.stats.record(EventStatus::Processing);

        let idem_key = fingerprint(&["webhook", &record.event_id]);
        let result = self
            .idempotency
            .execute(
                &idem_key,
                DuplicatePolicy::Wait(self.duplicate_wait),
                true,
                || async {
                    handler.handle(envelope).await?;
                    Ok(())
                },
            )
            .await;

        match result {
            Ok(outcome) => {
                record.status = EventStatus::Processed;
                record.processed_at = Some(Utc::now());
                self.ledger.put(&record).await?;
                if !outcome.replayed {
                    self.stats.record(EventStatus::Processed);
                }
                tracing::info!(event_id = %record.event_id, replayed = outcome.replayed, "Event processed");
                Ok(IngestOutcome {
                    event_id: record.event_id,
                    status: EventStatus::Processed,
                    replayed: outcome.replayed,
                })
            }
            Err(err) => {
                let mapped = from_idempotency(&record.event_id, err);
                self.record_failure(record, mapped).await
            }
        }
    }

    async fn record_failure(
        &self,
        mut record: EventRecord,
        err: EventError,
    ) -> EventResult<IngestOutcome> {
        match err {
            EventError::Handler { message, .. } => {
                match self.backoff.on_failure(&record.retry, &message, Utc::now()) {
                    FailureTransition::Scheduled(next) => {
                        tracing::warn!(
                            event_id = %record.event_id,
                            attempts = next.attempts,
                            next_attempt_at = ?next.next_attempt_at,
                            "Handler failed, retry scheduled"
                        );
                        record.retry = next;
                        record.status = EventStatus::Failed;
                        self.ledger.put(&record).await?;
                        self.stats.record(EventStatus::Failed);
                        Err(EventError::Handler {
                            event_id: record.event_id,
                            message,
                        })
                    }
                    FailureTransition::DeadLetter(final_state) => {
                        tracing::error!(
                            event_id = %record.event_id,
                            attempts = final_state.attempts,
                            "Retry budget exhausted, dead-lettering event"
                        );
                        record.retry = final_state;
                        record.status = EventStatus::DeadLettered;
                        self.ledger.put(&record).await?;
                        self.stats.record(EventStatus::DeadLettered);
                        // Acknowledged to the sender; surfaced to admins via
                        // the dead-letter listing
                        Ok(IngestOutcome {
                            event_id: record.event_id,
                            status: EventStatus::DeadLettered,
                            replayed: false,
                        })
                    }
                }
            }
            EventError::DeadLettered { .. } => {
                // The idempotency layer's own budget ran out first
                record.status = EventStatus::DeadLettered;
                record.retry.next_attempt_at = None;
                self.ledger.put(&record).await?;
                self.stats.record(EventStatus::DeadLettered);
                Ok(IngestOutcome {
                    event_id: record.event_id,
                    status: EventStatus::DeadLettered,
                    replayed: false,
                })
            }
            other => Err(other),
        }
    }

    /// Rolling-window statistics for the monitoring boundary
    pub fn stats(&self) -> EventCounts {
        self.stats.counts()
    }

    /// The event ledger (admin listings, scheduler dueness queries)
    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    /// The signature verifier (exposed for test tooling)
    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }
}

impl std::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_auth_core::AuthConfig;
    use vigil_store::MemoryStore;

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &EventEnvelope) -> Result<(), BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &EventEnvelope) -> Result<(), BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("downstream unavailable".into())
        }
    }

    struct Fixture {
        processor: EventProcessor,
        counting: Arc<CountingHandler>,
        failing: Arc<FailingHandler>,
    }

    fn fixture() -> Fixture {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let auth_config = AuthConfig::new("a-secret-that-is-at-least-32-bytes!!");
        let idempotency = Arc::new(IdempotencyManager::new(Arc::clone(&backend), &auth_config));

        let counting = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let failing = Arc::new(FailingHandler {
            calls: AtomicUsize::new(0),
        });

        let registry = HandlerRegistry::builder()
            .register(
                "invoice.payment_succeeded",
                Arc::clone(&counting) as Arc<dyn EventHandler>,
            )
            .register(
                "invoice.payment_failed",
                Arc::clone(&failing) as Arc<dyn EventHandler>,
            )
            .build()
            .unwrap();

        let config = EventConfig::new("whsec_test_secret_key_32_bytes_long!");
        let comparator = TimingSafeComparator::new(Duration::ZERO, Duration::ZERO);
        let processor =
            EventProcessor::new(config, backend, idempotency, comparator, registry).unwrap();

        Fixture {
            processor,
            counting,
            failing,
        }
    }

    fn payload(id: &str, event_type: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": id,
            "type": event_type,
            "created": Utc::now().timestamp(),
            "data": {"object": {"id": "sub_1", "customer": "cus_1"}}
        }))
        .unwrap()
    }

    fn signed(f: &Fixture, body: &[u8]) -> String {
        f.processor.verifier().sign(body, Utc::now().timestamp())
    }

    #[tokio::test]
    async fn test_event_processed_once() {
        let f = fixture();
        let body = payload("evt_123", "invoice.payment_succeeded");
        let header = signed(&f, &body);

        let outcome = f.processor.ingest(&body, &header).await.unwrap();
        assert_eq!(outcome.status, EventStatus::Processed);
        assert!(!outcome.replayed);
        assert_eq!(f.counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_redelivery_replays_without_side_effects() {
        let f = fixture();
        let body = payload("evt_123", "invoice.payment_succeeded");
        let header = signed(&f, &body);

        f.processor.ingest(&body, &header).await.unwrap();
        let second = f.processor.ingest(&body, &header).await.unwrap();

        assert_eq!(second.status, EventStatus::Processed);
        assert!(second.replayed);
        assert_eq!(f.counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forged_event_leaves_no_record() {
        let f = fixture();
        let body = payload("evt_forged", "invoice.payment_succeeded");

        let result = f.processor.ingest(&body, "t=1,v1=deadbeef").await;
        assert!(matches!(result, Err(EventError::SignatureMismatch)));
        assert_eq!(f.counting.calls.load(Ordering::SeqCst), 0);
        assert!(f.processor.ledger().get("evt_forged").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_type_acknowledged_not_retried() {
        let f = fixture();
        let body = payload("evt_unknown", "customer.created");
        let header = signed(&f, &body);

        let outcome = f.processor.ingest(&body, &header).await.unwrap();
        assert_eq!(outcome.status, EventStatus::Processed);

        let record = f.processor.ledger().get("evt_unknown").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Processed);
        assert_eq!(record.retry.attempts, 0);
    }

    #[tokio::test]
    async fn test_failing_handler_schedules_retry() {
        let f = fixture();
        let body = payload("evt_fail", "invoice.payment_failed");
        let header = signed(&f, &body);

        let result = f.processor.ingest(&body, &header).await;
        assert!(matches!(result, Err(EventError::Handler { .. })));

        let record = f.processor.ledger().get("evt_fail").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Failed);
        assert_eq!(record.retry.attempts, 1);
        assert!(record.retry.next_attempt_at.is_some());
        assert_eq!(
            record.retry.last_error.as_deref(),
            Some("downstream unavailable")
        );
    }

    #[tokio::test]
    async fn test_retries_exhaust_into_dead_letter() {
        let f = fixture();
        let body = payload("evt_doomed", "invoice.payment_failed");
        let header = signed(&f, &body);

        // First delivery plus resubmissions until the budget (5) is spent
        let _ = f.processor.ingest(&body, &header).await;
        for _ in 0..3 {
            let result = f.processor.resubmit("evt_doomed").await;
            assert!(matches!(result, Err(EventError::Handler { .. })));
        }
        let final_outcome = f.processor.resubmit("evt_doomed").await.unwrap();
        assert_eq!(final_outcome.status, EventStatus::DeadLettered);
        assert_eq!(f.failing.calls.load(Ordering::SeqCst), 5);

        // Terminal: further resubmission is refused, the handler stays quiet
        let result = f.processor.resubmit("evt_doomed").await;
        assert!(matches!(result, Err(EventError::DeadLettered { .. })));
        assert_eq!(f.failing.calls.load(Ordering::SeqCst), 5);

        let record = f.processor.ledger().get("evt_doomed").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::DeadLettered);
        assert!(record.retry.next_attempt_at.is_none());
    }

    #[tokio::test]
    async fn test_resubmit_unknown_event() {
        let f = fixture();
        let result = f.processor.resubmit("evt_missing").await;
        assert!(matches!(result, Err(EventError::UnknownEvent { .. })));
    }

    #[tokio::test]
    async fn test_stats_track_transitions() {
        let f = fixture();
        let ok_body = payload("evt_ok", "invoice.payment_succeeded");
        let ok_header = signed(&f, &ok_body);
        f.processor.ingest(&ok_body, &ok_header).await.unwrap();

        let bad_body = payload("evt_bad", "invoice.payment_failed");
        let bad_header = signed(&f, &bad_body);
        let _ = f.processor.ingest(&bad_body, &bad_header).await;

        let counts = f.processor.stats();
        assert_eq!(counts.processed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.received, 2);
    }

    #[tokio::test]
    async fn test_empty_registry_rejected_at_startup() {
        let result = HandlerRegistry::builder().build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_execute_handler_once() {
        let f = Arc::new(fixture());
        let body = payload("evt_race", "invoice.payment_succeeded");
        let header = signed(&f, &body);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let f = Arc::clone(&f);
            let body = body.clone();
            let header = header.clone();
            handles.push(tokio::spawn(async move {
                f.processor.ingest(&body, &header).await
            }));
        }

        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert_eq!(outcome.status, EventStatus::Processed);
        }
        assert_eq!(f.counting.calls.load(Ordering::SeqCst), 1);
    }
}
