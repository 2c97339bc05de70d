//! HTTP handlers for the catalog API.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

use stockroom_core::{IngestOutcome, ProductPage};

use crate::error::ApiError;
use crate::products::{ListingParams, ListingQuery};
use crate::server::AppState;

/// GET /products
///
/// Cursor-paginated catalog listing. Query parameters are normalized before
/// they reach the database: `limit` is clamped to `[1, 100]` with a default
/// of 20, `cursor` falls back to 0, and an unknown `sortBy` falls back to
/// `id`. Responses are served from the listing cache when a fresh page
/// exists for the same normalized query.
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListingParams>,
) -> Result<Json<ProductPage>, ApiError> {
    let query = ListingQuery::from_params(&params);
    let page = state.listings.list(&query).await?;
    Ok(Json(page))
}

/// Inbound webhook delivery body.
///
/// Everything except `eventId` is optional; missing fields are filled with
/// defaults before the event reaches the ledger.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDelivery {
    #[serde(default)]
    pub event_id: Option<String>,

    #[serde(default)]
    pub event_type: Option<String>,

    #[serde(default)]
    pub payload: Option<Value>,
}

/// POST /webhooks/event
///
/// Idempotent ingestion: the first delivery of an event id is processed and
/// acknowledged with `{"status": "processed"}`, every replay answers
/// `{"status": "already_processed"}` without touching the ledger again.
pub async fn ingest_webhook(
    State(state): State<AppState>,
    Json(delivery): Json<WebhookDelivery>,
) -> Result<Json<Value>, ApiError> {
    let event_id = delivery.event_id.unwrap_or_default();
    let outcome = state
        .webhooks
        .ingest(&event_id, delivery.event_type, delivery.payload)
        .await?;

    let body = match outcome {
        IngestOutcome::Processed => json!({
            "status": outcome.as_str(),
            "eventId": event_id,
        }),
        IngestOutcome::AlreadyProcessed => json!({
            "status": outcome.as_str(),
        }),
    };
    Ok(Json(body))
}

/// GET /external/data
///
/// Proxies the upstream provider, authenticating with the shared cached
/// token. Upstream failures surface as 502 once the retries are exhausted.
pub async fn external_data(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let data = state.external.fetch_data().await?;
    Ok(Json(json!({
        "source": "external-api",
        "data": data,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });
    (StatusCode::OK, Json(body))
}

/// Fallback for unmatched routes.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}
