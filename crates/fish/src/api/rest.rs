//! JSON handlers for `ApplicationService`/`LabelService`/`NodeService`
//! (§6.2), mounted under `/api/v1`. GraphQL is the richer surface; these
//! exist for callers (scripts, curl, the gate bridge's own future
//! tooling) that just want a plain request/response cycle.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::FishError;
use crate::model::Label;
use crate::uid::Uid;

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/applications", post(create_application).get(list_applications))
        .route("/api/v1/applications/{uid}", get(get_application))
        .route("/api/v1/applications/{uid}/state", get(get_application_state))
        .route("/api/v1/applications/{uid}/deallocate", post(deallocate_application))
        .route("/api/v1/labels", post(create_label).get(list_labels))
        .route("/api/v1/labels/{uid}", get(get_label).delete(delete_label))
        .route("/api/v1/nodes", get(list_nodes))
        .route("/api/v1/nodes/this", get(this_node))
}

fn error_status(e: &FishError) -> StatusCode {
    match e {
        FishError::Validation(_) => StatusCode::BAD_REQUEST,
        FishError::NotFound(_) => StatusCode::NOT_FOUND,
        FishError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        FishError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
        FishError::Driver { .. } => StatusCode::BAD_GATEWAY,
        FishError::State(_) => StatusCode::CONFLICT,
        FishError::Concurrency(_) => StatusCode::CONFLICT,
        FishError::FatalStartup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        FishError::Store(_) | FishError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: FishError) -> (StatusCode, Json<Value>) {
    let status = error_status(&e);
    (status, Json(json!({ "error": e.to_string(), "code": e.code() })))
}

fn parse_uid(raw: &str) -> Result<Uid, (StatusCode, Json<Value>)> {
    raw.parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid uid" }))))
}

#[derive(Deserialize)]
struct CreateApplicationBody {
    label_uid: String,
    owner_name: String,
    #[serde(default)]
    metadata: Value,
}

async fn create_application(
    State(state): State<AppState>,
    Json(body): Json<CreateApplicationBody>,
) -> impl IntoResponse {
    let label_uid = match parse_uid(&body.label_uid) {
        Ok(u) => u,
        Err(resp) => return resp.into_response(),
    };
    match state.engine.create(label_uid, &body.owner_name, body.metadata) {
        Ok(app) => (StatusCode::CREATED, Json(json!(app))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn list_applications(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.list() {
        Ok(apps) => Json(json!(apps)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn get_application(State(state): State<AppState>, Path(uid): Path<String>) -> impl IntoResponse {
    let uid = match parse_uid(&uid) {
        Ok(u) => u,
        Err(resp) => return resp.into_response(),
    };
    match state.engine.get(uid) {
        Ok(app) => Json(json!(app)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn get_application_state(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> impl IntoResponse {
    let uid = match parse_uid(&uid) {
        Ok(u) => u,
        Err(resp) => return resp.into_response(),
    };
    match state.engine.current_state(uid) {
        Ok(s) => Json(json!(s)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
struct DeallocateBody {
    requestor: String,
}

async fn deallocate_application(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(body): Json<DeallocateBody>,
) -> impl IntoResponse {
    let uid = match parse_uid(&uid) {
        Ok(u) => u,
        Err(resp) => return resp.into_response(),
    };
    match state.engine.deallocate(uid, &body.requestor) {
        Ok(s) => Json(json!(s)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
struct CreateLabelBody {
    name: String,
    #[serde(default)]
    version: u32,
    definitions: Value,
    #[serde(default)]
    metadata: Value,
}

async fn create_label(State(state): State<AppState>, Json(body): Json<CreateLabelBody>) -> impl IntoResponse {
    let definitions = match serde_json::from_value(body.definitions) {
        Ok(d) => d,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid definitions: {e}") })),
            )
                .into_response()
        }
    };
    let now = crate::model::now();
    let label = Label {
        uid: Uid::new(&state.identity.uid().node_prefix()),
        name: body.name,
        version: body.version,
        definitions,
        metadata: body.metadata,
        created_at: now,
        updated_at: now,
    };
    match state.catalog.create(label).await {
        Ok(l) => (StatusCode::CREATED, Json(json!(l))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn list_labels(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let name = params.get("name").map(String::as_str);
    let version = params.get("version").map(String::as_str);
    match state.catalog.list(name, version) {
        Ok(labels) => Json(json!(labels)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn get_label(State(state): State<AppState>, Path(uid): Path<String>) -> impl IntoResponse {
    let uid = match parse_uid(&uid) {
        Ok(u) => u,
        Err(resp) => return resp.into_response(),
    };
    match state.catalog.get(uid) {
        Ok(l) => Json(json!(l)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn delete_label(State(state): State<AppState>, Path(uid): Path<String>) -> impl IntoResponse {
    let uid = match parse_uid(&uid) {
        Ok(u) => u,
        Err(resp) => return resp.into_response(),
    };
    match state.catalog.delete(uid).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn list_nodes(State(state): State<AppState>) -> impl IntoResponse {
    match state.identity.active_nodes() {
        Ok(nodes) => Json(json!(nodes)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn this_node(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(state.identity.self_node)).into_response()
}
