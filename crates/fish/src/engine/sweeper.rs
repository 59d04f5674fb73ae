//! §4.6.4 — forced reclamation. Unlike `lifecycle`'s monitor (which only
//! acts on resources the local node owns), the sweeper runs on every
//! active node and only ever *writes* a state when the current one is
//! still the one it expects — so a duplicate sweep from a second node
//! racing the same application is a harmless no-op.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::{Engine, ShutdownGroup};
use crate::model::Status;

impl Engine {
    /// Applications `ALLOCATED` whose resource has passed its `timeout`:
    /// write `DEALLOCATE` and let the normal lifecycle path release the
    /// driver-side resource (§4.6.4 first half).
    async fn sweep_expired_resources(&self) {
        let resources = match self.resources().list() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "sweeper could not list resources");
                return;
            }
        };

        let now = Utc::now();
        for resource in resources {
            if !resource.is_past_timeout(now) {
                continue;
            }
            let current = match self.current_state(resource.application_uid) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if current.status != Status::Allocated {
                continue;
            }
            if let Err(e) = self.write_state(resource.application_uid, Status::Deallocate, "resource timeout reached") {
                warn!(error = %e, "sweeper failed to write DEALLOCATE for expired resource");
            } else {
                info!(application = %resource.application_uid, "sweeper reclaimed expired resource");
            }
        }
    }

    /// Applications `ELECTED` whose stamped node is no longer active:
    /// rewrite `NEW` so the elector re-opens the round (§4.6.4 second
    /// half, §8 scenario S6).
    async fn sweep_stale_elections(&self) {
        let applications = match self.applications().list() {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "sweeper could not list applications");
                return;
            }
        };

        let active_uids: Vec<_> = match self.identity.active_nodes() {
            Ok(nodes) => nodes.into_iter().map(|n| n.uid).collect(),
            Err(e) => {
                warn!(error = %e, "sweeper could not list active nodes");
                return;
            }
        };

        for application in applications {
            let current = match self.current_state(application.uid) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if current.status != Status::Elected {
                continue;
            }
            // The elected node's uid was recorded as the description text
            // (§4.6.1 step 4); parse it back to check liveness.
            let Ok(owner) = current.description.parse::<crate::uid::Uid>() else {
                continue;
            };
            if active_uids.contains(&owner) {
                continue;
            }
            if let Err(e) = self.write_state(
                application.uid,
                Status::New,
                format!("elected node {owner} went stale, reopening election"),
            ) {
                warn!(error = %e, "sweeper failed to rewrite stale election");
            } else {
                info!(application = %application.uid, node = %owner, "sweeper recovered stale election");
            }
        }
    }

    pub(super) fn spawn_sweeper(self: &Arc<Self>, shutdown: &ShutdownGroup) {
        let engine = self.clone();
        let interval = engine.config.sweeper_interval;
        shutdown.spawn("sweeper", move |mut stop| async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.sweep_expired_resources().await;
                        engine.sweep_stale_elections().await;
                    }
                    _ = stop.changed() => break,
                }
            }
        });
    }
}
