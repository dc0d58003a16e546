//! HTTP routes

pub mod webhook;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/webhook",
            post(webhook::handle_webhook).fallback(method_not_allowed),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Only POST is accepted on the webhook endpoint.
async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
