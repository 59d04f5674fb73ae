//! §4.6.2/§4.6.3 — allocation, monitoring, and deallocation. All three
//! ticks only act on resources this node owns (`resource.node_uid ==
//! self`); every other node's ticks pass over the same rows as no-ops.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::{Engine, ShutdownGroup};
use crate::drivers::ResourceStatus;
use crate::error::{FishError, FishResult};
use crate::model::{ApplicationResource, Status};
use crate::uid::Uid;

impl Engine {
    /// Called by the winning node right after it writes `ELECTED` (§4.6.1
    /// step 5). On failure, either re-opens election (`NEW`) or gives up
    /// (`ERROR`) once the retry cap is spent.
    pub(super) async fn attempt_allocate(&self, application_uid: Uid) -> FishResult<()> {
        let application = self.applications().get(&application_uid.to_string())?;
        let label = self.catalog.get(application.label_uid)?;

        let Some((definition, driver)) = self.drivers.pick_definition(&label.definitions) else {
            return self.retry_or_error(application_uid, "no driver available for label");
        };

        match driver.allocate(definition, &application.metadata).await {
            Ok(allocated) => {
                let now = Utc::now();
                let resource = ApplicationResource {
                    uid: Uid::new(&self.node_prefix()),
                    application_uid,
                    label_uid: application.label_uid,
                    node_uid: self.identity.uid(),
                    driver: definition.driver.clone(),
                    identifier: allocated.identifier,
                    hw_addr: allocated.hw_addr,
                    ip_addr: allocated.ip_addr,
                    authentication: allocated.authentication,
                    timeout: allocated.timeout,
                    metadata: allocated.metadata,
                    created_at: now,
                    updated_at: now,
                };
                self.resources().add(&resource.uid.to_string(), &resource)?;
                self.usage.record_allocation(&definition.driver, &definition.resources);
                self.write_state(
                    application_uid,
                    Status::Allocated,
                    format!("allocated by {}", self.identity.uid()),
                )?;
                info!(application = %application_uid, "application allocated");
                Ok(())
            }
            Err(e) => {
                let transient = matches!(&e, FishError::Driver { transient: true, .. });
                if transient {
                    self.retry_or_error(application_uid, &e.to_string())
                } else {
                    self.write_state(application_uid, Status::Error, format!("allocation failed: {e}"))
                        .map(|_| ())
                }
            }
        }
    }

    fn retry_or_error(&self, application_uid: Uid, reason: &str) -> FishResult<()> {
        let count = self.new_count(application_uid)?;
        if count >= self.config.retry_cap {
            self.write_state(
                application_uid,
                Status::Error,
                format!("retry cap ({}) exceeded: {reason}", self.config.retry_cap),
            )?;
        } else {
            self.write_state(application_uid, Status::New, reason.to_string())?;
        }
        Ok(())
    }

    /// Finds the label definition a resource was allocated through, so
    /// usage accounting can be released symmetrically with how it was
    /// recorded.
    fn release_usage(&self, resource: &ApplicationResource) {
        if let Ok(label) = self.catalog.get(resource.label_uid) {
            if let Some(def) = label.definitions.iter().find(|d| d.driver == resource.driver) {
                self.usage.record_release(&resource.driver, &def.resources);
            }
        }
    }

    /// §4.6.2 monitoring: while `ALLOCATED`, probe `Status`; on an
    /// unexpected `None` write `ERROR`; past the resource's deadline,
    /// initiate deallocation.
    pub(super) async fn monitor_tick(&self) {
        let self_uid = self.identity.uid();
        let resources = match self.resources().list() {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "monitor could not list resources");
                return;
            }
        };

        for resource in resources {
            if resource.node_uid != self_uid {
                continue;
            }
            let current = match self.current_state(resource.application_uid) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if current.status != Status::Allocated {
                continue;
            }

            let Some(driver) = self.drivers.get(&resource.driver) else {
                warn!(driver = %resource.driver, "monitor: unknown driver");
                continue;
            };
            match driver.status(&resource).await {
                Ok(ResourceStatus::Allocated) => {}
                Ok(ResourceStatus::None) => {
                    warn!(application = %resource.application_uid, "resource vanished underneath an allocated application");
                    let _ = self.write_state(resource.application_uid, Status::Error, "resource disappeared");
                }
                Err(e) => warn!(error = %e, "status probe failed, leaving state unchanged"),
            }
        }
    }

    /// §4.6.3: the owner observes `DEALLOCATE`, releases the driver-side
    /// resource, cascades ticket deletion, deletes the resource row, and
    /// writes `DEALLOCATED`.
    pub(super) async fn deallocation_tick(&self) {
        let self_uid = self.identity.uid();
        let applications = match self.applications().list() {
            Ok(a) => a,
            Err(e) => {
                error!(error = %e, "deallocation tick could not list applications");
                return;
            }
        };

        for application in applications {
            let current = match self.current_state(application.uid) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if current.status != Status::Deallocate {
                continue;
            }

            let resource = match self.resource_for(application.uid) {
                Ok(r) => r,
                Err(e) => {
                    error!(error = %e, "failed to look up resource for deallocation");
                    continue;
                }
            };

            let Some(resource) = resource else {
                let _ = self.write_state(application.uid, Status::Deallocated, "no resource on record");
                continue;
            };
            if resource.node_uid != self_uid {
                continue;
            }

            let Some(driver) = self.drivers.get(&resource.driver) else {
                let _ = self.write_state(
                    application.uid,
                    Status::Error,
                    format!("unknown driver {} during deallocation", resource.driver),
                );
                continue;
            };

            match driver.deallocate(&resource).await {
                Ok(()) => {
                    self.release_usage(&resource);
                    if let Err(e) = self.tickets.delete_by_resource(resource.uid) {
                        warn!(error = %e, "failed to cascade-delete access tickets");
                    }
                    if let Err(e) = self.resources().delete(&resource.uid.to_string()) {
                        error!(error = %e, "failed to delete application resource record");
                    }
                    let _ = self.write_state(application.uid, Status::Deallocated, "released");
                    info!(application = %application.uid, "application deallocated");
                }
                Err(e) => {
                    let _ = self.write_state(application.uid, Status::Error, format!("deallocate failed: {e}"));
                }
            }
        }
    }

    pub(super) fn spawn_lifecycle(self: &Arc<Self>, shutdown: &ShutdownGroup) {
        let monitor_engine = self.clone();
        let monitor_interval = monitor_engine.config.monitor_interval;
        shutdown.spawn("resource-monitor", move |mut stop| async move {
            let mut ticker = tokio::time::interval(monitor_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => monitor_engine.monitor_tick().await,
                    _ = stop.changed() => break,
                }
            }
        });

        let dealloc_engine = self.clone();
        let dealloc_interval = Duration::from_secs(2);
        shutdown.spawn("resource-deallocator", move |mut stop| async move {
            let mut ticker = tokio::time::interval(dealloc_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => dealloc_engine.deallocation_tick().await,
                    _ = stop.changed() => break,
                }
            }
        });
    }
}
