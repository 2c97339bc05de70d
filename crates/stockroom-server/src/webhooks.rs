//! Webhook ingestion with duplicate suppression.
//!
//! The idempotency decision is one atomic set-if-absent on a marker key:
//! whoever creates the marker owns the delivery, every replay inside the
//! marker's lifetime short-circuits to `already_processed`. The event
//! ledger's primary key is the second line of defense for replays that
//! arrive after the marker expired.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use stockroom_core::{CoreError, IngestOutcome, Result, WebhookEvent};
use stockroom_db_mysql::MySqlStorage;

use crate::kv::DynKeyValueClient;

const MARKER_TTL: Duration = Duration::from_secs(86_400);
const MARKER_VALUE: &str = "processed";

fn marker_key(event_id: &str) -> String {
    format!("webhook:event:{event_id}")
}

fn validate_event_id(event_id: &str) -> Result<()> {
    if event_id.trim().is_empty() {
        return Err(CoreError::invalid_input("eventId is required"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct WebhookService {
    storage: Arc<MySqlStorage>,
    kv: DynKeyValueClient,
}

impl WebhookService {
    #[must_use]
    pub fn new(storage: Arc<MySqlStorage>, kv: DynKeyValueClient) -> Self {
        Self { storage, kv }
    }

    /// Processes one delivery of an event.
    ///
    /// The marker write is load-bearing: if the store cannot answer, the
    /// delivery fails with `StoreUnavailable` so the source retries it.
    pub async fn ingest(
        &self,
        event_id: &str,
        event_type: Option<String>,
        payload: Option<Value>,
    ) -> Result<IngestOutcome> {
        validate_event_id(event_id)?;

        let key = marker_key(event_id);
        let first_delivery = self.kv.set_nx(&key, MARKER_VALUE, MARKER_TTL).await?;
        if !first_delivery {
            tracing::debug!(event_id = %event_id, "Webhook already processed");
            return Ok(IngestOutcome::AlreadyProcessed);
        }

        let event = WebhookEvent::new(
            event_id,
            event_type.unwrap_or_else(|| "unknown".to_string()),
            payload.unwrap_or_else(|| Value::Object(Default::default())),
        );

        match self.storage.record_event(&event).await {
            Ok(true) => {
                tracing::info!(event_id = %event_id, event_type = %event.event_type, "Webhook processed");
                Ok(IngestOutcome::Processed)
            }
            Ok(false) => {
                // Marker lapsed at some point but the ledger remembers.
                tracing::debug!(event_id = %event_id, "Webhook found in ledger");
                Ok(IngestOutcome::AlreadyProcessed)
            }
            Err(e) => {
                // Give the retry a chance to run the full path again.
                if let Err(del_err) = self.kv.delete(&key).await {
                    tracing::warn!(
                        event_id = %event_id,
                        error = %del_err,
                        "Failed to roll back idempotency marker"
                    );
                }
                Err(e)
            }
        }
    }
}
