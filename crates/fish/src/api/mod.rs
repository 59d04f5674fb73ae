//! C6-C9's transport collaborator (§1, §6): axum router, REST handlers,
//! the webhook ingestion point, and the GraphQL schema built in
//! `api::graphql`. Mirrors the teacher's `main.rs`/`state.rs` split —
//! `AppState` here plays the role of the teacher's `AppState`, just built
//! from this crate's own components instead of an agent pool.

pub mod graphql;
pub mod rest;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_graphql_axum::{GraphQLRequest, GraphQLResponse, GraphQLSubscription};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::capacity::UsageTracker;
use crate::catalog::Catalog;
use crate::drivers::DriverRegistry;
use crate::engine::Engine;
use crate::gate::github::GithubGateDriver;
use crate::gate::GateBridge;
use crate::identity::NodeRegistry;
use crate::store::Store;
use crate::tickets::TicketOffice;

use self::graphql::{build_schema, FishSchema};

/// Everything a handler needs, held behind `Arc`s so cloning `AppState`
/// for axum's per-request `State` extractor is cheap (same shape as the
/// teacher's `AppState`, which is `Clone` over `Arc` fields throughout).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub engine: Arc<Engine>,
    pub catalog: Arc<Catalog>,
    pub identity: Arc<NodeRegistry>,
    pub drivers: Arc<DriverRegistry>,
    pub usage: Arc<UsageTracker>,
    pub tickets: Arc<TicketOffice>,
    pub gate_bridge: Arc<GateBridge>,
    /// Gate drivers keyed by name, dispatched to from `POST /webhook/:gate`.
    pub gates: Arc<HashMap<String, Arc<GithubGateDriver>>>,
}

#[derive(Clone)]
struct RouterState {
    app: AppState,
    schema: FishSchema,
}

pub fn build_router(app: AppState, cors_origins: &[String], request_timeout: Duration) -> Router {
    let schema = build_schema();
    let state = RouterState { app, schema };

    let cors = if cors_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins = cors_origins
            .iter()
            .filter_map(|s| s.parse::<axum::http::HeaderValue>().ok())
            .collect::<Vec<_>>();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let rest_router = rest::router().with_state(state.app.clone());
    let webhook_router = webhook::router().with_state(state.app.clone());

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(readiness_handler))
        .route("/", get(root_handler))
        .route("/graphql", post(graphql_handler).get(graphql_playground))
        .route_service("/ws", GraphQLSubscription::new(state.schema.clone()))
        .merge(rest_router)
        .merge(webhook_router)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
                .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
                .layer(cors),
        )
        .with_state(state)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "fish",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "graphql": "/graphql",
            "ws": "/ws",
            "health": "/health",
            "ready": "/ready"
        }
    }))
}

async fn health_handler(State(_state): State<RouterState>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

async fn readiness_handler(State(state): State<RouterState>) -> impl IntoResponse {
    let active = state.app.identity.active_nodes().unwrap_or_default();
    let ready = active.iter().any(|n| n.uid == state.app.identity.uid());
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "ready": ready })))
}

async fn graphql_handler(State(state): State<RouterState>, req: GraphQLRequest) -> GraphQLResponse {
    let request = req.into_inner().data(state.app.clone());
    state.schema.execute(request).await.into()
}

async fn graphql_playground() -> impl IntoResponse {
    axum::response::Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql").subscription_endpoint("/ws"),
    ))
}
