//! Concrete `GateDriver` (§4.4.2) for GitHub Actions self-hosted runners —
//! the "gate (example, external-events)" of §6.4. Push mode verifies and
//! decodes `workflow_job` webhook deliveries; pull mode polls the same
//! shape from the REST API on an interval. Both funnel into
//! `GateBridge::handle_event` (§4.9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::engine::ShutdownGroup;
use crate::error::{FishError, FishResult};

use super::{GateBridge, JobStatus, WorkflowJobEvent};
use crate::drivers::GateDriver;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
pub struct RepoFilter {
    pub pattern: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubGateConfig {
    #[serde(default)]
    pub bind_address: Option<String>,
    pub api_token: String,
    #[serde(default = "default_per_page")]
    pub api_per_page: u32,
    #[serde(default = "default_update_interval")]
    pub api_update_hooks_interval: u64,
    #[serde(default)]
    pub filters: Vec<RepoFilter>,
    #[serde(default)]
    pub enterprise_base_url: Option<String>,
}

fn default_per_page() -> u32 {
    50
}

fn default_update_interval() -> u64 {
    30
}

impl GithubGateConfig {
    pub fn from_value(value: &Value) -> FishResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| FishError::Validation(format!("invalid github gate config: {e}")))
    }

    fn secret_for(&self, repo: &str) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| glob_match(&f.pattern, repo))
            .and_then(|f| f.webhook_secret.as_deref())
    }
}

/// Minimal `*`-glob matcher (repo patterns are `"org/*"` / `"org/repo"` —
/// no need for a full globbing crate for this one shape).
fn glob_match(pattern: &str, value: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == value,
        Some((prefix, suffix)) => value.starts_with(prefix) && value.ends_with(suffix),
    }
}

/// Raw shape of a GitHub `workflow_job` webhook payload — only the fields
/// the gate bridge needs.
#[derive(Debug, Deserialize)]
struct WorkflowJobPayload {
    action: String,
    repository: RepositoryPayload,
    workflow_job: WorkflowJobBody,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowJobBody {
    id: u64,
    run_id: u64,
    labels: Vec<String>,
    #[serde(default)]
    runner_id: Option<u64>,
}

pub struct GithubGateDriver {
    config: std::sync::RwLock<GithubGateConfig>,
    bridge: Arc<GateBridge>,
    catalog: Arc<crate::catalog::Catalog>,
    self_node: crate::uid::Uid,
    http: reqwest::Client,
}

impl GithubGateDriver {
    pub fn new(
        bridge: Arc<GateBridge>,
        catalog: Arc<crate::catalog::Catalog>,
        self_node: crate::uid::Uid,
        config: GithubGateConfig,
    ) -> Self {
        Self {
            config: std::sync::RwLock::new(config),
            bridge,
            catalog,
            self_node,
            http: reqwest::Client::new(),
        }
    }

    fn api_base(&self) -> String {
        self.config
            .read()
            .unwrap()
            .enterprise_base_url
            .clone()
            .unwrap_or_else(|| "https://api.github.com".to_string())
    }

    /// §4.9.4: HMAC-SHA-256 over the raw body, constant-time compared
    /// against `X-Hub-Signature-256`. Only push-mode requests are
    /// verified this way; pull-mode deliveries are trusted because they
    /// come from an authenticated upstream API call.
    pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
        let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
            return false;
        };
        let Ok(expected) = hex::decode(hex_sig) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(body);
        let computed = mac.finalize().into_bytes();
        computed.as_slice().ct_eq(&expected).into()
    }

    /// Decodes a `workflow_job` push payload into the bridge's event
    /// shape, first checking the repo's configured secret (if any).
    pub fn decode_push_event(
        &self,
        delivery_guid: &str,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> FishResult<WorkflowJobEvent> {
        let payload: WorkflowJobPayload = serde_json::from_slice(body)
            .map_err(|e| FishError::Validation(format!("malformed workflow_job payload: {e}")))?;

        let repo = &payload.repository.full_name;
        if let Some(secret) = self.config.read().unwrap().secret_for(repo) {
            let Some(header) = signature_header else {
                return Err(FishError::Unauthorized(format!(
                    "missing signature for {repo}, which requires one"
                )));
            };
            if !Self::verify_signature(secret, body, header) {
                return Err(FishError::Unauthorized(format!(
                    "signature mismatch for delivery to {repo}"
                )));
            }
        }

        let status = match payload.action.as_str() {
            "queued" => JobStatus::Queued,
            "in_progress" => JobStatus::InProgress,
            "completed" => JobStatus::Completed,
            other => {
                return Err(FishError::Validation(format!(
                    "unrecognized workflow_job action {other:?}"
                )))
            }
        };

        Ok(WorkflowJobEvent {
            delivery_guid: delivery_guid.to_string(),
            run_id: payload.workflow_job.run_id.to_string(),
            job_id: payload.workflow_job.id.to_string(),
            status,
            labels: payload.workflow_job.labels,
            runner_id: payload.workflow_job.runner_id.map(|id| id.to_string()),
        })
    }

    /// Full push-mode entry point used by `api::webhook`: decode + verify,
    /// then run the decoded event through the bridge (§4.9.1-4.9.2).
    pub async fn handle_push_delivery(
        self: &Arc<Self>,
        delivery_guid: &str,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> FishResult<()> {
        let payload: WorkflowJobPayload = serde_json::from_slice(body)
            .map_err(|e| FishError::Validation(format!("malformed workflow_job payload: {e}")))?;
        let repo = payload.repository.full_name.clone();

        let event = self.decode_push_event(delivery_guid, body, signature_header)?;

        let driver = self.clone();
        let lookup_repo = repo.clone();
        self.bridge
            .handle_event(
                event,
                |name, version| driver.lookup_label(name, version),
                driver.register_runner_token(&lookup_repo),
                self.self_node,
            )
            .await
    }

    /// §4.9.2 "Request a short-lived runner registration token from the
    /// external API" and build the connection-parameter metadata blob the
    /// driver hands to `ApplicationCreate`.
    pub async fn register_runner_token(&self, repo: &str) -> FishResult<Value> {
        let token = self.config.read().unwrap().api_token.clone();
        let url = format!("{}/repos/{repo}/actions/runners/registration-token", self.api_base());
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header("User-Agent", "aquarium-fish")
            .send()
            .await
            .map_err(|e| FishError::driver(format!("runner token request failed: {e}"), true))?;

        if !resp.status().is_success() {
            return Err(FishError::driver(
                format!("runner token request returned {}", resp.status()),
                true,
            ));
        }

        let body: HashMap<String, Value> = resp
            .json()
            .await
            .map_err(|e| FishError::driver(format!("malformed runner token response: {e}"), true))?;

        Ok(json!({
            "repo": repo,
            "registration_token": body.get("token").cloned().unwrap_or(Value::Null),
        }))
    }

    /// Pull-mode: poll `GET /repos/:repo/actions/runs` for queued/in-progress
    /// jobs on each configured repo pattern's literal repos and feed each
    /// one through the bridge exactly like a push delivery would,
    /// synthesizing a delivery GUID from `(runId, jobId, status)` so the
    /// at-most-once dedup ledger still applies.
    async fn poll_once(self: &Arc<Self>) {
        let repos: Vec<String> = self
            .config
            .read()
            .unwrap()
            .filters
            .iter()
            .filter(|f| !f.pattern.contains('*'))
            .map(|f| f.pattern.clone())
            .collect();

        for repo in repos {
            if let Err(e) = self.poll_repo(&repo).await {
                warn!(repo, error = %e, "github gate poll failed for repo");
            }
        }
    }

    async fn poll_repo(self: &Arc<Self>, repo: &str) -> FishResult<()> {
        let token = self.config.read().unwrap().api_token.clone();
        let per_page = self.config.read().unwrap().api_per_page;
        let url = format!("{}/repos/{repo}/actions/runs?per_page={per_page}", self.api_base());

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .header("User-Agent", "aquarium-fish")
            .send()
            .await
            .map_err(|e| FishError::driver(format!("workflow runs request failed: {e}"), true))?;

        if !resp.status().is_success() {
            return Err(FishError::driver(
                format!("workflow runs request returned {}", resp.status()),
                true,
            ));
        }

        let body: PolledRuns = resp
            .json()
            .await
            .map_err(|e| FishError::driver(format!("malformed workflow runs response: {e}"), true))?;

        for run in body.workflow_runs {
            let status = match run.status.as_str() {
                "queued" => JobStatus::Queued,
                "in_progress" => JobStatus::InProgress,
                "completed" => JobStatus::Completed,
                _ => continue,
            };
            let guid = format!("poll-{}-{}-{:?}", run.id, repo, status);
            let event = WorkflowJobEvent {
                delivery_guid: guid,
                run_id: run.id.to_string(),
                job_id: run.id.to_string(),
                status,
                labels: vec!["self-hosted".to_string(), run.name.clone()],
                runner_id: None,
            };

            let repo_owned = repo.to_string();
            let driver = self.clone();
            let lookup_repo = repo_owned.clone();
            let result = self
                .bridge
                .handle_event(
                    event,
                    |name, version| driver.lookup_label(name, version),
                    driver.register_runner_token(&lookup_repo),
                    self.self_node,
                )
                .await;
            if let Err(e) = result {
                warn!(repo = %repo_owned, error = %e, "failed to process polled job");
            }
        }
        Ok(())
    }

    /// Resolves a job's requested label by `name` (or `name:version`) per
    /// §4.9.2 against this node's catalog — `version=None` collapses to
    /// the highest version on record, matching `LabelList(version="last")`.
    fn lookup_label(&self, name: &str, version: Option<&str>) -> FishResult<Option<crate::uid::Uid>> {
        let labels = self.catalog.list(Some(name), Some(version.unwrap_or("last")))?;
        Ok(labels.into_iter().next().map(|l| l.uid))
    }
}

#[derive(Debug, Deserialize)]
struct PolledRuns {
    workflow_runs: Vec<PolledRun>,
}

#[derive(Debug, Deserialize)]
struct PolledRun {
    id: u64,
    name: String,
    status: String,
}

#[async_trait]
impl GateDriver for GithubGateDriver {
    fn name(&self) -> &str {
        "github"
    }

    async fn prepare(&self, _workdir: &std::path::Path, config: &Value) -> FishResult<()> {
        let parsed = GithubGateConfig::from_value(config)?;
        *self.config.write().unwrap() = parsed;
        Ok(())
    }

    async fn shutdown(&self) -> FishResult<()> {
        info!("github gate driver shutting down");
        Ok(())
    }
}

impl GithubGateDriver {
    pub fn spawn_poll_loop(self: &Arc<Self>, shutdown: &ShutdownGroup) {
        let driver = self.clone();
        let interval = Duration::from_secs(self.config.read().unwrap().api_update_hooks_interval);
        shutdown.spawn("github-gate-poll", move |mut stop| async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("github gate poll tick");
                        driver.poll_once().await;
                    }
                    _ = stop.changed() => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_and_wildcard_patterns() {
        assert!(glob_match("org/repo", "org/repo"));
        assert!(!glob_match("org/repo", "org/other"));
        assert!(glob_match("org/*", "org/anything"));
        assert!(!glob_match("org/*", "other/anything"));
    }

    #[test]
    fn verifies_known_hmac_vector() {
        // echo -n '{}' | openssl dgst -sha256 -hmac "secret"
        let secret = "secret";
        let body = b"{}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let computed = mac.finalize().into_bytes();
        let header = format!("sha256={}", hex::encode(computed));
        assert!(GithubGateDriver::verify_signature(secret, body, &header));
    }

    #[test]
    fn rejects_tampered_body() {
        let secret = "secret";
        let header = {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
            mac.update(b"{}");
            format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
        };
        assert!(!GithubGateDriver::verify_signature(secret, b"{\"x\":1}", &header));
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(!GithubGateDriver::verify_signature("secret", b"{}", "not-a-signature"));
    }
}
