//! C9 — the gate bridge: translates external CI events into
//! `ApplicationCreate`/`ApplicationDeallocate` calls (§4.4.2, §4.9).
//! Concrete transport (push webhook listener, pull poller) lives in
//! `gate::github`; this module owns the dedup ledger, the job→application
//! mapping, and the cleanup sweeper that are transport-agnostic.

pub mod github;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::{Engine, ShutdownGroup};
use crate::error::FishResult;
use crate::model::ObjectKind;
use crate::store::{Collection, Store};
use crate::uid::Uid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub guid: String,
    pub node_uid: Uid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateJob {
    /// `"<runId>-<jobId>"`, also the store key.
    pub key: String,
    pub run_id: String,
    pub job_id: String,
    pub status: JobStatus,
    pub application_uid: Option<Uid>,
    pub runner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The normalized shape of an upstream "workflow job" event (§4.9).
#[derive(Debug, Clone)]
pub struct WorkflowJobEvent {
    pub delivery_guid: String,
    pub run_id: String,
    pub job_id: String,
    pub status: JobStatus,
    /// Must contain `self-hosted` first, then `name` or `name:version`.
    pub labels: Vec<String>,
    pub runner_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub gate_name: String,
    pub delivery_valid_interval: Duration,
    pub default_job_max_lifetime: Duration,
}

pub struct GateBridge {
    store: Arc<Store>,
    engine: Arc<Engine>,
    config: GateConfig,
    node_prefix: [u8; 6],
}

impl GateBridge {
    pub fn new(store: Arc<Store>, engine: Arc<Engine>, config: GateConfig, node_prefix: [u8; 6]) -> Self {
        Self {
            store,
            engine,
            config,
            node_prefix,
        }
    }

    fn deliveries(&self) -> Collection<WebhookDelivery> {
        Collection::new(&self.store, ObjectKind::WebhookDelivery)
    }

    fn jobs(&self) -> Collection<GateJob> {
        Collection::new(&self.store, ObjectKind::GateJob)
    }

    /// Parses the label pair `["self-hosted", "name"]` or
    /// `["self-hosted", "name:version"]` (§4.9.2).
    fn label_from_job_labels(labels: &[String]) -> Option<(&str, Option<&str>)> {
        if labels.first().map(String::as_str) != Some("self-hosted") {
            return None;
        }
        let second = labels.get(1)?;
        Some(match second.split_once(':') {
            Some((name, version)) => (name, Some(version)),
            None => (second.as_str(), None),
        })
    }

    /// §4.9.1: records the delivery before any processing happens. A
    /// pre-existing record means this GUID was already handled (by this
    /// node or a peer racing in dual mode) — the caller should skip.
    fn claim_delivery(&self, guid: &str, node_uid: Uid) -> FishResult<bool> {
        if self.deliveries().has(guid)? {
            return Ok(false);
        }
        let record = WebhookDelivery {
            guid: guid.to_string(),
            node_uid,
            created_at: Utc::now(),
        };
        self.deliveries().add(guid, &record)?;
        Ok(true)
    }

    /// Entry point for both push and pull transports (§4.9.1-4.9.2).
    pub async fn handle_event(
        &self,
        event: WorkflowJobEvent,
        label_lookup: impl Fn(&str, Option<&str>) -> FishResult<Option<Uid>>,
        register_runner: impl Future<Output = FishResult<Value>>,
        self_node: Uid,
    ) -> FishResult<()> {
        if !self.claim_delivery(&event.delivery_guid, self_node)? {
            debug!(guid = %event.delivery_guid, "duplicate delivery, skipping");
            return Ok(());
        }

        let key = format!("{}-{}", event.run_id, event.job_id);

        match event.status {
            JobStatus::Queued => {
                let Some((name, version)) = Self::label_from_job_labels(&event.labels) else {
                    debug!(?event.labels, "job labels do not request a self-hosted runner, skipping");
                    return Ok(());
                };
                let Some(label_uid) = label_lookup(name, version)? else {
                    warn!(name, "no label matches requested runner, skipping");
                    return Ok(());
                };

                let metadata = register_runner.await?;
                let application = self.engine.create(label_uid, &self.config.gate_name, metadata)?;

                let job = GateJob {
                    key: key.clone(),
                    run_id: event.run_id,
                    job_id: event.job_id,
                    status: JobStatus::Queued,
                    application_uid: Some(application.uid),
                    runner_id: event.runner_id,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                };
                self.jobs().add(&key, &job)?;
                info!(application = %application.uid, job = %key, "gate bridge created application for queued job");
            }
            JobStatus::InProgress => {
                if let Ok(mut job) = self.jobs().get(&key) {
                    job.status = JobStatus::InProgress;
                    job.runner_id = event.runner_id;
                    job.updated_at = Utc::now();
                    self.jobs().add(&key, &job)?;
                }
            }
            JobStatus::Completed => {
                if let Ok(mut job) = self.jobs().get(&key) {
                    if let Some(application_uid) = job.application_uid {
                        self.engine
                            .deallocate(application_uid, &format!("gate/{}", self.config.gate_name))?;
                    }
                    job.status = JobStatus::Completed;
                    job.updated_at = Utc::now();
                    self.jobs().add(&key, &job)?;
                }
            }
        }
        Ok(())
    }

    /// §4.9.3 periodic cleanup.
    pub fn sweep(&self) {
        let now = Utc::now();

        if let Ok(deliveries) = self.deliveries().list() {
            for d in deliveries {
                if now - d.created_at > self.config.delivery_valid_interval {
                    let _ = self.deliveries().delete(&d.guid);
                }
            }
        }

        let jobs = match self.jobs().list() {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "gate sweeper could not list jobs");
                return;
            }
        };

        for job in jobs {
            match job.status {
                JobStatus::Completed => {
                    if now - job.updated_at > self.config.delivery_valid_interval {
                        let _ = self.jobs().delete(&job.key);
                    }
                }
                JobStatus::Queued => {
                    if now - job.created_at > self.config.default_job_max_lifetime {
                        if let Some(application_uid) = job.application_uid {
                            let _ = self.engine.deallocate(application_uid, "gate/sweeper-lifetime");
                        }
                        let _ = self.jobs().delete(&job.key);
                    }
                }
                JobStatus::InProgress => {
                    let Some(application_uid) = job.application_uid else {
                        let _ = self.jobs().delete(&job.key);
                        continue;
                    };
                    let resource = self.engine.resource_for(application_uid).ok().flatten();
                    let state_active = self
                        .engine
                        .current_state(application_uid)
                        .map(|s| s.status.is_active())
                        .unwrap_or(false);

                    match resource {
                        None if !state_active => {
                            let _ = self.jobs().delete(&job.key);
                        }
                        Some(r) => {
                            let past_timeout = r.is_past_timeout(now)
                                || now - job.created_at > self.config.default_job_max_lifetime;
                            if past_timeout {
                                let _ = self.engine.deallocate(application_uid, "gate/sweeper-lifetime");
                                let _ = self.jobs().delete(&job.key);
                            }
                        }
                        None => {}
                    }
                }
            }
        }
    }

    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: &ShutdownGroup, interval: std::time::Duration) {
        let bridge = self.clone();
        shutdown.spawn("gate-sweeper", move |mut stop| async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => bridge.sweep(),
                    _ = stop.changed() => break,
                }
            }
        });
    }

    pub fn node_prefix(&self) -> [u8; 6] {
        self.node_prefix
    }
}
