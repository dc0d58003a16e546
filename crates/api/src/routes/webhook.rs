//! Webhook ingestion endpoint
//!
//! Orchestrates the pipeline for one delivery: authenticate (signature +
//! replay window), normalize, deduplicate, plan, execute with retry, record
//! the outcome. Providers over-deliver, so the endpoint must be safe to call
//! arbitrarily many times per event while applying durable side effects at
//! most once per event id.
//!
//! Concurrent deliveries of the same event can both pass the idempotency
//! check in a narrow window; the ledger store's unique constraint on
//! `idempotency_key` coalesces that race, not in-process locking.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Serialize;
use time::OffsetDateTime;

use paygate_ingest::{is_fresh, normalize, plan, verify, Outcome, REPLAY_WINDOW};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
}

/// `POST /api/webhook`
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let started = Instant::now();
    let delivery_id = headers
        .get("x-webhook-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        tracing::warn!(
            delivery_id = %delivery_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Webhook rejected: content type is not JSON"
        );
        return Err(ApiError::Validation("Invalid content type".into()));
    }

    let Some(signature) = headers
        .get("x-webhook-signature")
        .or_else(|| headers.get("x-signature"))
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!(
            delivery_id = %delivery_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Webhook rejected: missing signature header"
        );
        return Err(ApiError::Unauthorized("Missing signature header".into()));
    };
    // Only a fragment is ever logged; never the secret or the full signature
    let sig_fragment: String = signature.chars().take(12).collect();

    let secret = &state.config.webhook_secret;
    if secret.is_empty() {
        tracing::error!(
            delivery_id = %delivery_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Webhook secret not configured, refusing to process"
        );
        return Err(ApiError::Internal("Webhook secret not configured".into()));
    }

    if !verify(&body, signature, secret) {
        tracing::warn!(
            delivery_id = %delivery_id,
            signature_fragment = %sig_fragment,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Security event: webhook signature verification failed"
        );
        return Err(ApiError::Unauthorized("Invalid signature".into()));
    }

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(
                delivery_id = %delivery_id,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Webhook rejected: invalid JSON"
            );
            return Err(ApiError::Validation("Invalid JSON payload".into()));
        }
    };

    let event = match normalize(&raw) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                delivery_id = %delivery_id,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Webhook rejected: normalization failed"
            );
            return Err(ApiError::Validation("Invalid event structure".into()));
        }
    };

    if !is_fresh(event.timestamp, OffsetDateTime::now_utc(), REPLAY_WINDOW) {
        tracing::warn!(
            event_id = %event.event_id,
            delivery_id = %delivery_id,
            signature_fragment = %sig_fragment,
            event_timestamp = %event.timestamp,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Security event: webhook timestamp outside replay window"
        );
        return Err(ApiError::Unauthorized("Invalid timestamp".into()));
    }

    if state.ingest.idempotency.is_processed(&event.event_id).await {
        tracing::info!(
            event_id = %event.event_id,
            delivery_id = %delivery_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Duplicate delivery short-circuited"
        );
        return Ok(Json(WebhookResponse {
            success: true,
            message: "idempotent".into(),
            processed: Some(true),
        }));
    }

    let actions = plan(&event);
    tracing::info!(
        event_id = %event.event_id,
        event_type = %event.event_type,
        status = %event.status,
        action_count = actions.len(),
        "Processing webhook event"
    );

    match state.ingest.executor.execute_with_retry(&event, &actions).await {
        Ok(_) => {
            state
                .ingest
                .idempotency
                .mark_processed(&event.event_id, Outcome::Success)
                .await;
            tracing::info!(
                event_id = %event.event_id,
                delivery_id = %delivery_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Webhook event processed"
            );
            Ok(Json(WebhookResponse {
                success: true,
                message: "processed".into(),
                processed: Some(true),
            }))
        }
        Err(e) => {
            // Marked failure, not success: the next legitimate redelivery is
            // free to retry.
            state
                .ingest
                .idempotency
                .mark_processed(&event.event_id, Outcome::Failure)
                .await;
            tracing::error!(
                event_id = %event.event_id,
                delivery_id = %delivery_id,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Webhook reconciliation failed after retries"
            );
            Err(ApiError::Internal("Reconciliation failed".into()))
        }
    }
}
