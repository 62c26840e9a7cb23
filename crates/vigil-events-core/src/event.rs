//! Webhook event records
//!
//! One record per external event ID, stored in the shared backend and
//! carrying the processing state machine:
//! `received -> processing -> processed | failed`, with `failed` either
//! rescheduled (attempts below the cap) or dead-lettered (terminal).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use vigil_store::{KeyValueStore, StoreError, namespace};

use crate::error::EventResult;

/// Processing status of a webhook event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Received,
    Processing,
    Processed,
    Failed,
    DeadLettered,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Processing => write!(f, "processing"),
            Self::Processed => write!(f, "processed"),
            Self::Failed => write!(f, "failed"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

/// Retry bookkeeping owned by failed events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryState {
    /// Handler executions so far
    pub attempts: u32,
    /// When the external scheduler may resubmit the event
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Most recent handler error
    pub last_error: Option<String>,
}

/// One webhook event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub event_type: String,
    pub status: EventStatus,
    pub signature_verified: bool,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry: RetryState,
    /// Original payload, kept so resubmission can re-run the handler
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Create a fresh record for a verified delivery
    pub fn received(event_id: String, event_type: String, payload: serde_json::Value) -> Self {
        Self {
            event_id,
            event_type,
            status: EventStatus::Received,
            signature_verified: true,
            received_at: Utc::now(),
            processed_at: None,
            retry: RetryState::default(),
            payload,
        }
    }

    /// Whether the external scheduler should resubmit this event now
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Failed
            && self.retry.next_attempt_at.is_none_or(|at| at <= now)
    }
}

/// Event record persistence over the shared backend
pub struct EventLedger {
    backend: Arc<dyn KeyValueStore>,
    retention: Duration,
}

impl EventLedger {
    pub fn new(backend: Arc<dyn KeyValueStore>, retention: Duration) -> Self {
        Self { backend, retention }
    }

    fn record_key(event_id: &str) -> String {
        format!("{}{}", namespace::EVENT, event_id)
    }

    /// Load a record by external event ID
    pub async fn get(&self, event_id: &str) -> EventResult<Option<EventRecord>> {
        let key = Self::record_key(event_id);
        let Some(raw) = self.backend.get(&key).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            key,
            detail: e.to_string(),
        })?;
        Ok(Some(record))
    }

    /// Persist a record (overwrites; the retention TTL restarts)
    pub async fn put(&self, record: &EventRecord) -> EventResult<()> {
        let value = serde_json::to_string(record)?;
        self.backend
            .set_ex(&Self::record_key(&record.event_id), &value, self.retention)
            .await?;
        Ok(())
    }

    /// List records in a given status, for the administrative surface
    pub async fn list_by_status(
        &self,
        status: EventStatus,
        limit: usize,
    ) -> EventResult<Vec<EventRecord>> {
        let keys = self
            .backend
            .scan_prefix(namespace::EVENT, limit.saturating_mul(4))
            .await?;

        let mut records = Vec::new();
        for key in keys {
            if records.len() >= limit {
                break;
            }
            let event_id = key.strip_prefix(namespace::EVENT).unwrap_or(&key);
            if let Some(record) = self.get(event_id).await?
                && record.status == status
            {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// List failed events whose next attempt is due, for the external
    /// resubmission scheduler
    pub async fn list_due(&self, now: DateTime<Utc>, limit: usize) -> EventResult<Vec<EventRecord>> {
        let failed = self.list_by_status(EventStatus::Failed, limit).await?;
        Ok(failed.into_iter().filter(|r| r.is_due(now)).collect())
    }
}

impl std::fmt::Debug for EventLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLedger")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_store::MemoryStore;

    fn ledger() -> EventLedger {
        EventLedger::new(Arc::new(MemoryStore::new()), Duration::from_secs(3600))
    }

    fn record(id: &str, status: EventStatus) -> EventRecord {
        let mut r = EventRecord::received(
            id.to_string(),
            "invoice.payment_succeeded".to_string(),
            serde_json::json!({}),
        );
        r.status = status;
        r
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let ledger = ledger();
        let r = record("evt_1", EventStatus::Received);
        ledger.put(&r).await.unwrap();

        let loaded = ledger.get("evt_1").await.unwrap().unwrap();
        assert_eq!(loaded.event_id, "evt_1");
        assert_eq!(loaded.status, EventStatus::Received);
        assert!(loaded.signature_verified);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let ledger = ledger();
        ledger.put(&record("evt_1", EventStatus::Processed)).await.unwrap();
        ledger.put(&record("evt_2", EventStatus::DeadLettered)).await.unwrap();
        ledger.put(&record("evt_3", EventStatus::DeadLettered)).await.unwrap();

        let dead = ledger
            .list_by_status(EventStatus::DeadLettered, 10)
            .await
            .unwrap();
        assert_eq!(dead.len(), 2);
    }

    #[tokio::test]
    async fn test_list_due_filters_future_attempts() {
        let ledger = ledger();

        let mut due = record("evt_due", EventStatus::Failed);
        due.retry.next_attempt_at = Some(Utc::now() - chrono::TimeDelta::minutes(1));
        ledger.put(&due).await.unwrap();

        let mut later = record("evt_later", EventStatus::Failed);
        later.retry.next_attempt_at = Some(Utc::now() + chrono::TimeDelta::hours(1));
        ledger.put(&later).await.unwrap();

        let due_now = ledger.list_due(Utc::now(), 10).await.unwrap();
        assert_eq!(due_now.len(), 1);
        assert_eq!(due_now[0].event_id, "evt_due");
    }
}
