//! In-memory provider driver used by end-to-end scenario tests (S1-S4,
//! S6). Tracks a configurable resource ceiling and hands back synthetic
//! identifiers instead of touching any real infrastructure.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FishResult;
use crate::model::label::LabelDefinition;
use crate::model::{ApplicationResource, Resources};

use super::{AllocatedResource, ProviderDriver, ResourceStatus};

pub struct TestDriver {
    name: String,
    /// Total units of `cpu`/`ram` this driver pretends to own; `None`
    /// means "unbounded", used by scenarios that only exercise the
    /// lifecycle, not capacity contention.
    resources_limit: Option<Resources>,
    allocated: AtomicU64,
    next_id: AtomicI64,
}

impl TestDriver {
    pub fn new(name: impl Into<String>, resources_limit: Option<Resources>) -> Self {
        Self {
            name: name.into(),
            resources_limit,
            allocated: AtomicU64::new(0),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }
}

#[async_trait]
impl ProviderDriver for TestDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prepare(&self, _config: &Value) -> FishResult<()> {
        Ok(())
    }

    fn validate_definition(&self, definition: &LabelDefinition) -> FishResult<()> {
        definition
            .validate()
            .map_err(crate::error::FishError::Validation)
    }

    async fn available_capacity(
        &self,
        usage: &Resources,
        definition: &LabelDefinition,
    ) -> FishResult<i64> {
        let Some(limit) = &self.resources_limit else {
            return Ok(i64::MAX);
        };
        let mut usage = usage.clone();
        Ok(crate::capacity::available_capacity(
            &mut usage,
            &definition.resources,
            limit.cpu,
            limit.ram,
            limit.cpu_overbook,
            limit.ram_overbook,
        ))
    }

    async fn allocate(
        &self,
        _definition: &LabelDefinition,
        metadata: &Value,
    ) -> FishResult<AllocatedResource> {
        self.allocated.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(AllocatedResource {
            identifier: format!("test-{id}"),
            hw_addr: None,
            ip_addr: Some(format!("10.0.0.{}", id % 254 + 1)),
            authentication: None,
            timeout: None,
            metadata: metadata.clone(),
        })
    }

    async fn status(&self, _resource: &ApplicationResource) -> FishResult<ResourceStatus> {
        Ok(ResourceStatus::Allocated)
    }

    async fn deallocate(&self, _resource: &ApplicationResource) -> FishResult<()> {
        self.allocated.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::label::DiskResource;
    use std::collections::HashMap;

    fn definition(cpu: u32, ram: u32) -> LabelDefinition {
        LabelDefinition {
            driver: "test".into(),
            resources: Resources {
                cpu,
                ram,
                disks: HashMap::<String, DiskResource>::new(),
                network: String::new(),
                multitenancy: false,
                cpu_overbook: 0,
                ram_overbook: 0,
            },
            images: Vec::new(),
            authentication: None,
        }
    }

    #[tokio::test]
    async fn unbounded_driver_always_bids() {
        let driver = TestDriver::unbounded("test");
        let usage = definition(1, 1).resources;
        let cap = driver.available_capacity(&usage, &definition(4, 4)).await.unwrap();
        assert_eq!(cap, i64::MAX);
    }

    #[tokio::test]
    async fn bounded_driver_runs_out() {
        let limit = definition(4, 8).resources;
        let driver = TestDriver::new("test", Some(limit));
        let usage = definition(0, 0).resources;
        let cap = driver
            .available_capacity(&usage, &definition(2, 2))
            .await
            .unwrap();
        assert_eq!(cap, 2);
    }

    #[tokio::test]
    async fn allocate_and_deallocate_round_trips() {
        let driver = TestDriver::unbounded("test");
        let resource = driver
            .allocate(&definition(1, 1), &Value::Null)
            .await
            .unwrap();
        assert!(resource.identifier.starts_with("test-"));
    }
}
