//! Webhook event persistence.
//!
//! The `webhook_events` primary key is the caller-supplied event id, so a
//! redelivered event collides on insert. That collision is reported as a
//! clean duplicate rather than an error, giving delivery a second line of
//! defense when the fast-path marker was lost.

use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_mysql::MySqlPool;

use stockroom_core::{CoreError, WebhookEvent};

use crate::error::is_duplicate_entry;

/// Records a processed webhook event.
///
/// Returns `Ok(true)` when the event was stored for the first time and
/// `Ok(false)` when a row with the same event id already exists.
pub async fn insert_event(pool: &MySqlPool, event: &WebhookEvent) -> Result<bool, CoreError> {
    let result = query(
        "INSERT INTO webhook_events (id, event_type, payload, processed_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(event.id.clone())
    .bind(event.event_type.clone())
    .bind(event.payload.clone())
    .bind(event.processed_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_duplicate_entry(&e) => {
            tracing::debug!(event_id = %event.id, "Webhook event already recorded");
            Ok(false)
        }
        Err(e) => {
            tracing::warn!(event_id = %event.id, error = %e, "Webhook event insert failed");
            Err(CoreError::store_unavailable(
                "mysql",
                format!("Webhook event insert failed: {e}"),
            ))
        }
    }
}

/// Reports whether an event with the given id has been recorded.
pub async fn event_exists(pool: &MySqlPool, event_id: &str) -> Result<bool, CoreError> {
    let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM webhook_events WHERE id = ?")
        .bind(event_id)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            CoreError::store_unavailable("mysql", format!("Webhook event lookup failed: {e}"))
        })?;

    Ok(count > 0)
}
