//! C6 — the allocation engine: the `Application` lifecycle state machine
//! and its public operations (§4.6). The engine itself never talks to a
//! driver directly outside of `lifecycle`/`election`; this module is the
//! thin, synchronous-looking façade those background loops and the API
//! layer call into.

mod election;
mod lifecycle;
mod shutdown;
mod sweeper;

pub use shutdown::ShutdownGroup;

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::capacity::UsageTracker;
use crate::catalog::Catalog;
use crate::drivers::DriverRegistry;
use crate::error::{FishError, FishResult};
use crate::identity::NodeRegistry;
use crate::model::{Application, ApplicationResource, ApplicationState, ObjectKind, Status};
use crate::store::{Collection, Store};
use crate::tickets::TicketOffice;
use crate::uid::Uid;

/// Tunables that would otherwise be magic numbers scattered through
/// `election`/`sweeper` (§6.4).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub election_window: chrono::Duration,
    pub elector_interval: std::time::Duration,
    pub monitor_interval: std::time::Duration,
    pub sweeper_interval: std::time::Duration,
    /// Number of `NEW` re-entries tolerated before an application is
    /// abandoned with `ERROR` (§9 open question: default 3).
    pub retry_cap: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            election_window: chrono::Duration::seconds(5),
            elector_interval: std::time::Duration::from_secs(5),
            monitor_interval: std::time::Duration::from_secs(10),
            sweeper_interval: std::time::Duration::from_secs(15),
            retry_cap: 3,
        }
    }
}

pub struct Engine {
    store: Arc<Store>,
    identity: Arc<NodeRegistry>,
    catalog: Arc<Catalog>,
    drivers: Arc<DriverRegistry>,
    usage: Arc<UsageTracker>,
    tickets: Arc<TicketOffice>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        identity: Arc<NodeRegistry>,
        catalog: Arc<Catalog>,
        drivers: Arc<DriverRegistry>,
        usage: Arc<UsageTracker>,
        tickets: Arc<TicketOffice>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            identity,
            catalog,
            drivers,
            usage,
            tickets,
            config,
        }
    }

    fn applications(&self) -> Collection<Application> {
        Collection::new(&self.store, ObjectKind::Application)
    }

    fn states(&self) -> Collection<ApplicationState> {
        Collection::new(&self.store, ObjectKind::ApplicationState)
    }

    fn resources(&self) -> Collection<ApplicationResource> {
        Collection::new(&self.store, ObjectKind::ApplicationResource)
    }

    fn node_prefix(&self) -> [u8; 6] {
        self.identity.uid().node_prefix()
    }

    fn write_state(&self, application_uid: Uid, status: Status, description: impl Into<String>) -> FishResult<ApplicationState> {
        let state = ApplicationState {
            uid: Uid::new(&self.node_prefix()),
            application_uid,
            status,
            description: description.into(),
            created_at: Utc::now(),
        };
        self.states().add(&state.uid.to_string(), &state)?;
        Ok(state)
    }

    /// Current (latest by `created_at`) state for an application.
    pub fn current_state(&self, application_uid: Uid) -> FishResult<ApplicationState> {
        let mut states: Vec<ApplicationState> = self
            .states()
            .list()?
            .into_iter()
            .filter(|s| s.application_uid == application_uid)
            .collect();
        states.sort_by_key(|s| s.created_at);
        states
            .into_iter()
            .last()
            .ok_or_else(|| FishError::NotFound("application state".into()))
    }

    /// Number of `NEW` records written for this application so far — the
    /// retry count the elector's cap acts on (§4.6.1 step 5).
    fn new_count(&self, application_uid: Uid) -> FishResult<u32> {
        Ok(self
            .states()
            .list()?
            .into_iter()
            .filter(|s| s.application_uid == application_uid && s.status == Status::New)
            .count() as u32)
    }

    pub fn resource_for(&self, application_uid: Uid) -> FishResult<Option<ApplicationResource>> {
        Ok(self
            .resources()
            .list()?
            .into_iter()
            .find(|r| r.application_uid == application_uid))
    }

    /// `ApplicationCreate(labelUid, ownerName, metadata)` (§6.2). Validates
    /// the label reference, persists the `Application`, and writes the
    /// initial `NEW` state so the elector picks it up on its next tick.
    pub fn create(
        &self,
        label_uid: Uid,
        owner_name: &str,
        metadata: serde_json::Value,
    ) -> FishResult<Application> {
        self.catalog.get(label_uid)?;

        let application = Application {
            uid: Uid::new(&self.node_prefix()),
            label_uid,
            owner_name: owner_name.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        self.applications().add(&application.uid.to_string(), &application)?;
        self.write_state(application.uid, Status::New, "created")?;
        info!(application = %application.uid, label = %label_uid, "application created");
        Ok(application)
    }

    pub fn get(&self, uid: Uid) -> FishResult<Application> {
        self.applications().get(&uid.to_string())
    }

    pub fn list(&self) -> FishResult<Vec<Application>> {
        self.applications().list()
    }

    /// `ApplicationDeallocate(appUid, requestor)` (§4.6.3).
    pub fn deallocate(&self, application_uid: Uid, requestor: &str) -> FishResult<ApplicationState> {
        let current = self.current_state(application_uid)?;
        if !current.status.is_active() {
            return Ok(current);
        }
        if current.status == Status::New {
            return self.write_state(
                application_uid,
                Status::Deallocated,
                format!("deallocated from NEW by {requestor}"),
            );
        }
        self.write_state(application_uid, Status::Deallocate, format!("requested by {requestor}"))
    }

    pub fn subscribe_states(&self) -> crate::store::Subscription<ApplicationState> {
        self.states().subscribe()
    }

    /// Starts the elector, monitor, deallocator, and sweeper loops (§4.6,
    /// §5). Each registers itself in `shutdown` so `ShutdownGroup::shutdown`
    /// blocks until all four have drained.
    pub fn spawn_background(self: &Arc<Self>, shutdown: &ShutdownGroup) {
        self.spawn_elector(shutdown);
        self.spawn_lifecycle(shutdown);
        self.spawn_sweeper(shutdown);
    }
}
