//! `POST /webhook/:gate` (§6.3): the push-mode ingestion point for gate
//! drivers that deliver events over HTTP rather than polling. Looks the
//! named gate up in `AppState::gates` and hands the raw body + headers to
//! its `handle_push_delivery`; the driver owns signature verification and
//! dedup (§4.9.1, §4.9.4).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::post,
    Router,
};
use serde_json::json;
use tracing::warn;

use crate::error::FishError;

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/{gate}", post(webhook_handler))
}

async fn webhook_handler(
    State(state): State<AppState>,
    Path(gate): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(driver) = state.gates.get(&gate) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no gate driver registered as {gate:?}") })),
        );
    };

    let delivery_guid = headers
        .get("X-GitHub-Delivery")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if delivery_guid.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing X-GitHub-Delivery header" })),
        );
    }
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok());

    match driver.handle_push_delivery(delivery_guid, &body, signature).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "accepted" }))),
        Err(FishError::Unauthorized(msg)) => {
            warn!(gate, error = %msg, "rejected webhook delivery: signature mismatch");
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": msg })))
        }
        Err(FishError::Validation(msg)) => {
            warn!(gate, error = %msg, "rejected malformed webhook delivery");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": msg })))
        }
        Err(e) => {
            warn!(gate, error = %e, "webhook delivery processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}
