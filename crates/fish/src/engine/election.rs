//! §4.6.1 — the periodic elector. Every active node runs the same tick;
//! the tie-break rule (`highest available`, then `min nodeUid` bytewise)
//! guarantees at most one of them ends up writing `ELECTED`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::{Engine, ShutdownGroup};
use crate::error::FishResult;
use crate::model::{ObjectKind, Status, Vote};
use crate::store::Collection;
use crate::uid::Uid;

impl Engine {
    fn votes(&self) -> Collection<Vote> {
        Collection::new(&self.store, ObjectKind::Vote)
    }

    /// Applications whose current state is `NEW` (§4.6.1 step 1, minus the
    /// stale-`ELECTED` half, which `sweeper` rewrites to `NEW` first).
    fn new_candidates(&self) -> FishResult<Vec<Uid>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for application in self.applications().list()? {
            if seen.contains(&application.uid) {
                continue;
            }
            if let Ok(state) = self.current_state(application.uid) {
                if state.status == Status::New {
                    seen.insert(application.uid);
                    out.push(application.uid);
                }
            }
        }
        Ok(out)
    }

    pub(super) async fn elector_tick(&self) {
        let candidates = match self.new_candidates() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "elector could not list candidate applications");
                return;
            }
        };
        for application_uid in candidates {
            if let Err(e) = self.run_election_round(application_uid).await {
                warn!(application = %application_uid, error = %e, "election round failed");
            }
        }
    }

    async fn run_election_round(&self, application_uid: Uid) -> FishResult<()> {
        let round = self.new_count(application_uid)?;
        if round >= self.config.retry_cap {
            self.write_state(
                application_uid,
                Status::Error,
                format!("retry cap ({}) exceeded", self.config.retry_cap),
            )?;
            return Ok(());
        }

        let application = self.applications().get(&application_uid.to_string())?;
        let label = self.catalog.get(application.label_uid)?;
        let self_uid = self.identity.uid();

        let available = match self.drivers.pick_definition(&label.definitions) {
            Some((definition, driver)) => {
                let usage = self.usage.usage_for(&definition.driver);
                driver
                    .available_capacity(&usage, definition)
                    .await
                    .unwrap_or(-1)
            }
            None => -1,
        };

        let vote = Vote {
            uid: Uid::new(&self.node_prefix()),
            application_uid,
            node_uid: self_uid,
            round,
            available,
            created_at: Utc::now(),
        };
        self.votes().add(&vote.uid.to_string(), &vote)?;

        tokio::time::sleep(
            self.config
                .election_window
                .to_std()
                .unwrap_or(Duration::from_secs(5)),
        )
        .await;

        // A round may finish after the application already moved on (e.g.
        // a faster peer elected itself and allocated already); re-check.
        if self.current_state(application_uid)?.status != Status::New {
            return Ok(());
        }

        let votes: Vec<Vote> = self
            .votes()
            .list()?
            .into_iter()
            .filter(|v| v.application_uid == application_uid && v.round == round)
            .collect();

        let winner = votes.iter().filter(|v| v.available > 0).fold(None, |best: Option<&Vote>, v| {
            match best {
                None => Some(v),
                Some(b) if v.available > b.available => Some(v),
                Some(b) if v.available == b.available && v.node_uid.as_bytes() < b.node_uid.as_bytes() => Some(v),
                Some(b) => Some(b),
            }
        });

        match winner {
            Some(v) if v.node_uid == self_uid => {
                self.write_state(application_uid, Status::Elected, self_uid.to_string())?;
                self.attempt_allocate(application_uid).await?;
            }
            Some(_) => {
                debug!(application = %application_uid, "lost election to another node");
            }
            None => {
                // Nobody could bid. The lowest-uid active node is
                // responsible for bumping the round so the application
                // doesn't stall silently waiting for capacity to appear.
                let mut actives = self.identity.active_nodes()?;
                actives.sort_by_key(|n| n.uid);
                if actives.first().map(|n| n.uid) == Some(self_uid) {
                    self.write_state(application_uid, Status::New, "no node could offer capacity")?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn spawn_elector(self: &Arc<Self>, shutdown: &ShutdownGroup) {
        let engine = self.clone();
        let interval = engine.config.elector_interval;
        shutdown.spawn("elector", move |mut stop| async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => engine.elector_tick().await,
                    _ = stop.changed() => break,
                }
            }
        });
    }
}
