//! C7 — per-application side-effect tasks fired on state transitions
//! (§4.7). Subscribes to `ApplicationState` changes; only the node that
//! owns the application's resource actually runs tasks, so duplicate
//! execution across peers can't happen.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::drivers::DriverRegistry;
use crate::engine::ShutdownGroup;
use crate::model::{ApplicationResource, ApplicationState, ApplicationTask, ObjectKind};
use crate::store::{Collection, Store};
use crate::uid::Uid;

pub struct TaskScheduler {
    store: Arc<Store>,
    drivers: Arc<DriverRegistry>,
    self_node: Uid,
}

impl TaskScheduler {
    pub fn new(store: Arc<Store>, drivers: Arc<DriverRegistry>, self_node: Uid) -> Self {
        Self {
            store,
            drivers,
            self_node,
        }
    }

    fn tasks(&self) -> Collection<ApplicationTask> {
        Collection::new(&self.store, ObjectKind::ApplicationTask)
    }

    fn resources(&self) -> Collection<ApplicationResource> {
        Collection::new(&self.store, ObjectKind::ApplicationResource)
    }

    pub fn spawn(self: Arc<Self>, shutdown: &ShutdownGroup) {
        let scheduler = self.clone();
        shutdown.spawn("task-scheduler", move |mut stop| async move {
            use crate::store::RecvOutcome;

            let states: Collection<ApplicationState> =
                Collection::new(&scheduler.store, ObjectKind::ApplicationState);
            let mut sub = states.subscribe();

            loop {
                tokio::select! {
                    outcome = sub.recv() => {
                        match outcome {
                            RecvOutcome::Event(_, state) => scheduler.on_state(&state).await,
                            RecvOutcome::Lagged => {
                                warn!("task scheduler lagged behind application state changes");
                            }
                            RecvOutcome::Closed => {
                                warn!("application state subscription closed, stopping task scheduler");
                                break;
                            }
                        }
                    }
                    _ = stop.changed() => {
                        info!("task scheduler shutting down");
                        break;
                    }
                }
            }
        });
    }

    /// Called for every newly persisted `ApplicationState`; looks up
    /// pending tasks matching `(application, state.status)` and runs them.
    pub async fn on_state(&self, state: &ApplicationState) {
        let pending: Vec<ApplicationTask> = match self.tasks().list() {
            Ok(tasks) => tasks
                .into_iter()
                .filter(|t| {
                    t.application_uid == state.application_uid
                        && t.when == state.status
                        && t.is_pending()
                })
                .collect(),
            Err(e) => {
                error!(error = %e, "failed to list application tasks");
                return;
            }
        };

        if pending.is_empty() {
            return;
        }

        let resource = match self.resources().scan_for_application(state.application_uid) {
            Some(r) => r,
            None => {
                debug!(application = %state.application_uid, "no resource yet, deferring tasks");
                return;
            }
        };

        if resource.node_uid != self.self_node {
            // Only the owning node runs tasks (§4.7).
            return;
        }

        for task in pending {
            self.run_task(task, &resource).await;
        }
    }

    async fn run_task(&self, mut task: ApplicationTask, resource: &ApplicationResource) {
        let Some(driver) = self.drivers.get(&resource.driver) else {
            warn!(driver = %resource.driver, "unknown driver for scheduled task");
            return;
        };

        let result = match driver.get_task(&task.task, &task.options) {
            Some(job) => job.execute(resource).await,
            None => {
                warn!(task = %task.task, "driver does not implement this task, skipping");
                return;
            }
        };

        task.result = Some(match result {
            Ok(value) => json!({ "ok": true, "value": value }),
            Err(e) => json!({ "ok": false, "error": e.to_string() }),
        });
        task.updated_at = Utc::now();

        if let Err(e) = self.tasks().add(&task.uid.to_string(), &task) {
            error!(error = %e, "failed to persist task result");
        }
    }
}

impl Collection<'_, ApplicationResource> {
    fn scan_for_application(&self, application_uid: Uid) -> Option<ApplicationResource> {
        self.list()
            .ok()?
            .into_iter()
            .find(|r| r.application_uid == application_uid)
    }
}
