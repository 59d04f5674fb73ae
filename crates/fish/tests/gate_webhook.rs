//! Webhook ingestion scenarios (§8 S5) against a real `GateBridge` +
//! `GithubGateDriver`, with a local mock standing in for the GitHub REST
//! API so no network call leaves the test process.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};

use common::Harness;
use fish::error::FishError;
use fish::gate::github::{GithubGateConfig, GithubGateDriver, RepoFilter};
use fish::gate::{GateBridge, GateConfig};

async fn registration_token_stub(Path(_rest): Path<String>) -> Json<Value> {
    Json(json!({ "token": "mock-registration-token" }))
}

/// Binds a local HTTP server that answers any
/// `POST /repos/.../actions/runners/registration-token` with a canned
/// token, standing in for `api.github.com` (§4.9.2).
async fn spawn_mock_github() -> String {
    let app = Router::new().route("/repos/{*rest}", post(registration_token_stub));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn workflow_job_body(action: &str, run_id: u64, job_id: u64, repo: &str, labels: &[&str]) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "action": action,
        "repository": { "full_name": repo },
        "workflow_job": {
            "id": job_id,
            "run_id": run_id,
            "labels": labels,
            "runner_id": Value::Null,
        }
    }))
    .unwrap()
}

async fn github_driver(harness: &Harness, filters: Vec<RepoFilter>) -> Arc<GithubGateDriver> {
    let mock_base = spawn_mock_github().await;

    let bridge = Arc::new(GateBridge::new(
        harness.store.clone(),
        harness.engine.clone(),
        GateConfig {
            gate_name: "github".to_string(),
            delivery_valid_interval: chrono::Duration::hours(1),
            default_job_max_lifetime: chrono::Duration::hours(1),
        },
        harness.identity.uid().node_prefix(),
    ));

    let config = GithubGateConfig {
        bind_address: None,
        api_token: "test-token".to_string(),
        api_per_page: 50,
        api_update_hooks_interval: 30,
        filters,
        enterprise_base_url: Some(mock_base),
    };

    Arc::new(GithubGateDriver::new(
        bridge,
        harness.catalog.clone(),
        harness.identity.uid(),
        config,
    ))
}

/// S5 — two webhook deliveries with the same `X-GitHub-Delivery` guid
/// result in exactly one `Application`/`GateJob`/dedup record, not two.
#[tokio::test]
async fn s5_duplicate_delivery_guid_is_deduplicated() {
    let harness = Harness::single_node(None);
    harness.create_label("linux", 1, 1).await;

    let driver = github_driver(&harness, Vec::new()).await;
    let body = workflow_job_body("queued", 1, 1, "acme/widgets", &["self-hosted", "linux"]);

    driver
        .handle_push_delivery("delivery-guid-1", &body, None)
        .await
        .expect("first delivery should be accepted");
    driver
        .handle_push_delivery("delivery-guid-1", &body, None)
        .await
        .expect("duplicate delivery should be a silent no-op, not an error");

    let applications = harness.engine.list().unwrap();
    assert_eq!(applications.len(), 1, "duplicate delivery must not create a second application");
}

/// A push delivery for a repo with a configured secret is rejected with
/// `Unauthorized` when the signature doesn't match, and never reaches the
/// engine (no application is created).
#[tokio::test]
async fn signature_mismatch_is_rejected_and_creates_nothing() {
    let harness = Harness::single_node(None);
    harness.create_label("linux", 1, 1).await;

    let filters = vec![RepoFilter {
        pattern: "acme/widgets".to_string(),
        webhook_secret: Some("shared-secret".to_string()),
    }];
    let driver = github_driver(&harness, filters).await;
    let body = workflow_job_body("queued", 1, 1, "acme/widgets", &["self-hosted", "linux"]);

    let result = driver
        .handle_push_delivery("delivery-guid-2", &body, Some("sha256=0000000000000000000000000000000000000000000000000000000000000000"))
        .await;

    assert!(matches!(result, Err(FishError::Unauthorized(_))));
    assert!(harness.engine.list().unwrap().is_empty());
}

/// A push delivery for a repo with a configured secret is accepted once
/// the HMAC matches, and creates exactly one application.
#[tokio::test]
async fn signature_match_is_accepted() {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let harness = Harness::single_node(None);
    harness.create_label("linux", 1, 1).await;

    let filters = vec![RepoFilter {
        pattern: "acme/widgets".to_string(),
        webhook_secret: Some("shared-secret".to_string()),
    }];
    let driver = github_driver(&harness, filters).await;
    let body = workflow_job_body("queued", 1, 1, "acme/widgets", &["self-hosted", "linux"]);

    let mut mac = Hmac::<Sha256>::new_from_slice(b"shared-secret").unwrap();
    mac.update(&body);
    let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    driver
        .handle_push_delivery("delivery-guid-3", &body, Some(&signature))
        .await
        .expect("correctly signed delivery should be accepted");

    let applications = harness.engine.list().unwrap();
    assert_eq!(applications.len(), 1);
}

/// The `InProgress`/`Completed` transitions update and then deallocate
/// the application the `Queued` event created, without creating a second
/// one.
#[tokio::test]
async fn job_lifecycle_deallocates_on_completed() {
    let harness = Harness::single_node(None);
    harness.create_label("linux", 1, 1).await;
    let driver = github_driver(&harness, Vec::new()).await;

    let queued = workflow_job_body("queued", 7, 7, "acme/widgets", &["self-hosted", "linux"]);
    driver.handle_push_delivery("d-queued", &queued, None).await.unwrap();

    let apps = harness.engine.list().unwrap();
    assert_eq!(apps.len(), 1);
    let app_uid = apps[0].uid;
    common::wait_for_status(&harness.engine, app_uid, fish::model::Status::Allocated, Duration::from_secs(3)).await;

    let in_progress = workflow_job_body("in_progress", 7, 7, "acme/widgets", &["self-hosted", "linux"]);
    driver.handle_push_delivery("d-inprogress", &in_progress, None).await.unwrap();

    let completed = workflow_job_body("completed", 7, 7, "acme/widgets", &["self-hosted", "linux"]);
    driver.handle_push_delivery("d-completed", &completed, None).await.unwrap();

    common::wait_for_status(&harness.engine, app_uid, fish::model::Status::Deallocated, Duration::from_secs(5)).await;
    assert_eq!(harness.engine.list().unwrap().len(), 1, "completed job must not create an extra application");
}
