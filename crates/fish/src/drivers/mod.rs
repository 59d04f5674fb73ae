//! C4 — the provider/gate driver contracts (§4.4). Concrete drivers are
//! registered into a `DriverRegistry` at startup from the config's driver
//! map, the way the teacher registers concrete services onto its server
//! (`main.rs`'s `add_service` calls) — here onto a plain `Vec` instead of
//! a gRPC server, since node-to-node communication goes through the store,
//! not RPC.

pub mod docker_driver;
pub mod image;
pub mod test_driver;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FishResult;
use crate::model::label::LabelDefinition;
use crate::model::ApplicationResource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Allocated,
    None,
}

/// A per-application side-effect task, produced by `ProviderDriver::get_task`
/// (§4.7). Idempotent: a re-run after restart that observes a persisted
/// result should be a no-op, which `ApplicationTask::is_pending` enforces
/// at the scheduler layer rather than here.
#[async_trait]
pub trait ResourceDriverTask: Send + Sync {
    async fn execute(&self, resource: &ApplicationResource) -> FishResult<Value>;
}

/// Materializes environments on local or remote infrastructure (§4.4.1).
#[async_trait]
pub trait ProviderDriver: Send + Sync {
    fn name(&self) -> &str;

    /// If true, this node's own CPU/RAM are not consumed by allocations —
    /// the driver tracks its own (remote) usage.
    fn is_remote(&self) -> bool {
        false
    }

    async fn prepare(&self, config: &Value) -> FishResult<()>;

    fn validate_definition(&self, definition: &LabelDefinition) -> FishResult<()>;

    /// Number of additional instances of `definition` this node/driver
    /// could currently allocate. `0` means none; `-1` means the driver
    /// cannot currently report (treated as a non-bid by the elector).
    async fn available_capacity(
        &self,
        usage: &crate::model::Resources,
        definition: &LabelDefinition,
    ) -> FishResult<i64>;

    /// Transactional from the caller's viewpoint: either a resource comes
    /// back and the driver owns matching external state, or an error comes
    /// back and the driver has best-effort cleaned up.
    async fn allocate(
        &self,
        definition: &LabelDefinition,
        metadata: &Value,
    ) -> FishResult<AllocatedResource>;

    async fn status(&self, resource: &ApplicationResource) -> FishResult<ResourceStatus>;

    /// Idempotent — removing a non-existent resource is not an error.
    async fn deallocate(&self, resource: &ApplicationResource) -> FishResult<()>;

    fn get_task(
        &self,
        _name: &str,
        _options: &Value,
    ) -> Option<Arc<dyn ResourceDriverTask>> {
        None
    }
}

/// What `ProviderDriver::allocate` hands back before the engine wraps it
/// into a persisted `ApplicationResource`.
pub struct AllocatedResource {
    pub identifier: String,
    pub hw_addr: Option<String>,
    pub ip_addr: Option<String>,
    pub authentication: Option<Value>,
    pub timeout: Option<chrono::DateTime<chrono::Utc>>,
    pub metadata: Value,
}

/// Translates external events into `ApplicationCreate`/`ApplicationDeallocate`
/// calls (§4.4.2). `Prepare`/`Shutdown` bracket the driver's lifetime;
/// `GetRPCServices` is intentionally opaque here — transport wiring is out
/// of the core's scope (§1) and lives in `api::webhook` / `gate`.
#[async_trait]
pub trait GateDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn prepare(&self, workdir: &std::path::Path, config: &Value) -> FishResult<()>;

    async fn shutdown(&self) -> FishResult<()>;
}

pub struct DriverRegistry {
    providers: HashMap<String, Arc<dyn ProviderDriver>>,
    /// Priority order in which a label's definitions are tried (§4.6.1
    /// step 2: "picks a matching definition per driver priority").
    priority: Vec<String>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            priority: Vec::new(),
        }
    }

    pub fn register(&mut self, driver: Arc<dyn ProviderDriver>) {
        self.priority.push(driver.name().to_string());
        self.providers.insert(driver.name().to_string(), driver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderDriver>> {
        self.providers.get(name).cloned()
    }

    /// The first definition (in driver-priority order) whose driver is
    /// registered on this node (§4.6.1 step 2).
    pub fn pick_definition<'a>(
        &self,
        definitions: &'a [LabelDefinition],
    ) -> Option<(&'a LabelDefinition, Arc<dyn ProviderDriver>)> {
        for name in &self.priority {
            if let Some(def) = definitions.iter().find(|d| &d.driver == name) {
                if let Some(driver) = self.providers.get(name) {
                    return Some((def, driver.clone()));
                }
            }
        }
        None
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
