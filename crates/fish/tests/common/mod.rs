//! Shared fixtures for the end-to-end scenario tests (§8). Builds a real
//! `Engine` wired to a temporary on-disk `Store`, a `TestDriver`, and
//! background loops ticking fast enough to exercise several election
//! rounds inside a test's timeout budget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fish::capacity::UsageTracker;
use fish::catalog::Catalog;
use fish::drivers::test_driver::TestDriver;
use fish::drivers::DriverRegistry;
use fish::engine::{Engine, EngineConfig, ShutdownGroup};
use fish::identity::NodeRegistry;
use fish::model::{Label, LabelDefinition, NodeDefinition, Resources};
use fish::store::Store;
use fish::tickets::TicketOffice;
use fish::uid::Uid;

/// Fast enough to run several election/monitor/sweeper rounds within a
/// few hundred milliseconds, without being so fast the election window
/// races its own tick interval.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        election_window: chrono::Duration::milliseconds(80),
        elector_interval: Duration::from_millis(30),
        monitor_interval: Duration::from_millis(50),
        sweeper_interval: Duration::from_millis(50),
        retry_cap: 3,
    }
}

pub fn bootstrap_node(store: Arc<Store>, name: &str, cert_seed: u8) -> Arc<NodeRegistry> {
    let cert_der = vec![cert_seed; 32];
    Arc::new(
        NodeRegistry::bootstrap(
            store,
            name,
            "127.0.0.1:0",
            "",
            NodeDefinition {
                host: name.to_string(),
                cpu: Vec::new(),
                memory: 0,
                disks: Vec::new(),
                nets: Vec::new(),
            },
            &cert_der,
            10,
        )
        .expect("bootstrap should not fail for a fresh name"),
    )
}

pub fn resources(cpu: u32, ram: u32) -> Resources {
    Resources {
        cpu,
        ram,
        disks: HashMap::new(),
        network: String::new(),
        multitenancy: false,
        cpu_overbook: 0,
        ram_overbook: 0,
    }
}

pub fn test_label_definition(driver: &str, cpu: u32, ram: u32) -> LabelDefinition {
    LabelDefinition {
        driver: driver.to_string(),
        resources: resources(cpu, ram),
        images: Vec::new(),
        authentication: None,
    }
}

/// A single-node harness: one `Store`, one `NodeRegistry`, one `Engine`
/// with a `TestDriver` registered as `"test"`, background loops already
/// spawned with `fast_config()`.
pub struct Harness {
    pub store: Arc<Store>,
    pub engine: Arc<Engine>,
    pub catalog: Arc<Catalog>,
    pub identity: Arc<NodeRegistry>,
    pub tickets: Arc<TicketOffice>,
    pub shutdown: ShutdownGroup,
    _tempdir: tempfile::TempDir,
}

impl Harness {
    pub fn single_node(resources_limit: Option<Resources>) -> Self {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(Store::open(tempdir.path()).expect("open store"));
        let identity = bootstrap_node(store.clone(), "node-a", 1);
        let catalog = Arc::new(Catalog::new(store.clone()));
        let usage = Arc::new(UsageTracker::new());
        let tickets = Arc::new(TicketOffice::new(store.clone(), identity.uid().node_prefix()));

        let mut drivers = DriverRegistry::new();
        drivers.register(Arc::new(TestDriver::new("test", resources_limit)));
        let drivers = Arc::new(drivers);

        let engine = Arc::new(Engine::new(
            store.clone(),
            identity.clone(),
            catalog.clone(),
            drivers.clone(),
            usage.clone(),
            tickets.clone(),
            fast_config(),
        ));

        let shutdown = ShutdownGroup::new();
        engine.spawn_background(&shutdown);

        Self {
            store,
            engine,
            catalog,
            identity,
            tickets,
            shutdown,
            _tempdir: tempdir,
        }
    }

    /// A harness whose driver reports zero available capacity for every
    /// definition, so an application stays in `NEW` at least through its
    /// first election round (used for S4, which deallocates immediately
    /// after creation and never lets a round run).
    pub fn single_node_no_capacity() -> Self {
        Self::single_node(Some(resources(0, 0)))
    }

    pub async fn create_label(&self, name: &str, cpu: u32, ram: u32) -> Label {
        let now = fish::model::now();
        let label = Label {
            uid: Uid::new(&self.identity.uid().node_prefix()),
            name: name.to_string(),
            version: 1,
            definitions: vec![test_label_definition("test", cpu, ram)],
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        };
        self.catalog.create(label).await.expect("label create")
    }
}

/// Polls `Engine::current_state` until it matches `want` or `timeout`
/// elapses; panics on timeout so a stuck scenario fails loudly instead of
/// hanging the suite.
pub async fn wait_for_status(
    engine: &Engine,
    application_uid: Uid,
    want: fish::model::Status,
    timeout: Duration,
) -> fish::model::ApplicationState {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(state) = engine.current_state(application_uid) {
            if state.status == want {
                return state;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for application {application_uid} to reach {want:?}");
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
}

/// Like `wait_for_status`, but accepts whichever of `wanted` the
/// application reaches first — for scenarios where a specific identity
/// (e.g. the election winner) isn't pinned down by the spec.
pub async fn wait_for_any_status(
    engine: &Engine,
    application_uid: Uid,
    wanted: &[fish::model::Status],
    timeout: Duration,
) -> fish::model::ApplicationState {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(state) = engine.current_state(application_uid) {
            if wanted.contains(&state.status) {
                return state;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for application {application_uid} to reach one of {wanted:?}");
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
}
