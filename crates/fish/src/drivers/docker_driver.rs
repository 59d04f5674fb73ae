//! Local container provider driver (§4.4.1), grounded in the teacher's
//! `docker::client`/`docker::container` wrappers around `bollard`. Each
//! allocation is one container; capacity is this host's own CPU/RAM
//! after reserving what other allocations already hold.

use async_trait::async_trait;
use bollard::container::Config;
use bollard::models::HostConfig;
use bollard::query_parameters::{
    CreateContainerOptions, RemoveContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{FishError, FishResult};
use crate::model::label::LabelDefinition;
use crate::model::{ApplicationResource, Resources};

use super::{AllocatedResource, ProviderDriver, ResourceStatus};

pub struct DockerDriver {
    client: Docker,
    /// This host's own totals — the driver's own view of "what's total
    /// capacity", handed to `capacity::available_capacity` by the caller.
    host_cpu: u32,
    host_ram: u32,
}

impl DockerDriver {
    pub fn connect(socket_path: &str, host_cpu: u32, host_ram: u32) -> FishResult<Self> {
        let client = if socket_path.is_empty() {
            Docker::connect_with_local_defaults()
        } else {
            let clean = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(clean, 120, bollard::API_DEFAULT_VERSION)
        }
        .map_err(|e| FishError::FatalStartup(format!("docker connect failed: {e}")))?;

        Ok(Self {
            client,
            host_cpu,
            host_ram,
        })
    }

    fn image_ref(definition: &LabelDefinition) -> Option<&str> {
        definition.images.first().map(|i| i.url.as_str())
    }
}

#[async_trait]
impl ProviderDriver for DockerDriver {
    fn name(&self) -> &str {
        "docker"
    }

    async fn prepare(&self, _config: &Value) -> FishResult<()> {
        self.client
            .ping()
            .await
            .map_err(|e| FishError::FatalStartup(format!("docker daemon unreachable: {e}")))?;
        Ok(())
    }

    fn validate_definition(&self, definition: &LabelDefinition) -> FishResult<()> {
        definition.validate().map_err(FishError::Validation)?;
        if definition.images.is_empty() {
            return Err(FishError::Validation(
                "docker driver requires at least one image".into(),
            ));
        }
        Ok(())
    }

    async fn available_capacity(
        &self,
        usage: &Resources,
        definition: &LabelDefinition,
    ) -> FishResult<i64> {
        let mut usage = usage.clone();
        Ok(crate::capacity::available_capacity(
            &mut usage,
            &definition.resources,
            self.host_cpu,
            self.host_ram,
            0,
            0,
        ))
    }

    async fn allocate(
        &self,
        definition: &LabelDefinition,
        metadata: &Value,
    ) -> FishResult<AllocatedResource> {
        let image = Self::image_ref(definition)
            .ok_or_else(|| FishError::Validation("no image configured for docker driver".into()))?;

        let memory_bytes = (definition.resources.ram as i64) * 1024 * 1024;
        let nano_cpus = (definition.resources.cpu as i64) * 1_000_000_000;

        let config = Config {
            image: Some(image.to_string()),
            host_config: Some(HostConfig {
                memory: Some(memory_bytes),
                nano_cpus: Some(nano_cpus),
                publish_all_ports: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: None,
            platform: None,
        });

        let created = self
            .client
            .create_container(options, config)
            .await
            .map_err(|e| FishError::driver(format!("container create failed: {e}"), true))?;

        self.client
            .start_container(&created.id, None)
            .await
            .map_err(|e| FishError::driver(format!("container start failed: {e}"), true))?;

        let inspected = self
            .client
            .inspect_container(&created.id, None)
            .await
            .map_err(|e| FishError::driver(format!("container inspect failed: {e}"), false))?;

        let ip_addr = inspected
            .network_settings
            .as_ref()
            .and_then(|n| n.ip_address.clone())
            .filter(|ip| !ip.is_empty());

        info!(container = %created.id, "docker container allocated");

        Ok(AllocatedResource {
            identifier: created.id,
            hw_addr: None,
            ip_addr,
            authentication: None,
            timeout: None,
            metadata: metadata.clone(),
        })
    }

    async fn status(&self, resource: &ApplicationResource) -> FishResult<ResourceStatus> {
        match self
            .client
            .inspect_container(&resource.identifier, None)
            .await
        {
            Ok(details) => {
                let running = details
                    .state
                    .and_then(|s| s.running)
                    .unwrap_or(false);
                Ok(if running {
                    ResourceStatus::Allocated
                } else {
                    ResourceStatus::None
                })
            }
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Ok(ResourceStatus::None)
            }
            Err(e) => Err(FishError::driver(format!("container status check failed: {e}"), true)),
        }
    }

    async fn deallocate(&self, resource: &ApplicationResource) -> FishResult<()> {
        let stop_options = Some(StopContainerOptions {
            t: Some(10),
            ..Default::default()
        });
        if let Err(e) = self.client.stop_container(&resource.identifier, stop_options).await {
            warn!(container = %resource.identifier, error = %e, "stop failed, proceeding to remove");
        }

        let remove_options = Some(RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        });
        match self.client.remove_container(&resource.identifier, remove_options).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(FishError::driver(format!("container remove failed: {e}"), true)),
        }
    }
}
