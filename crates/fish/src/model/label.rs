use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::uid::Uid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelImage {
    pub name: String,
    pub version: String,
    pub url: String,
    /// `algo:hex`, e.g. `sha256:deadbeef...`.
    pub checksum: Option<String>,
}

impl LabelImage {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("image name must not be empty".into());
        }
        if self.url.is_empty() {
            return Err("image url must not be empty".into());
        }
        if let Some(sum) = &self.checksum {
            if crate::drivers::image::ChecksumAlgo::parse(sum).is_none() {
                return Err(format!("unrecognized checksum format: {sum}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: u32,
    pub ram: u32,
    #[serde(default)]
    pub disks: std::collections::HashMap<String, DiskResource>,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub multitenancy: bool,
    #[serde(default)]
    pub cpu_overbook: u32,
    #[serde(default)]
    pub ram_overbook: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskResource {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub size: u64,
    #[serde(default)]
    pub reuse: bool,
}

impl Resources {
    pub fn validate(&self) -> Result<(), String> {
        if self.cpu == 0 {
            return Err("resources.cpu must be > 0".into());
        }
        if self.ram == 0 {
            return Err("resources.ram must be > 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelDefinition {
    pub driver: String,
    pub resources: Resources,
    #[serde(default)]
    pub images: Vec<LabelImage>,
    #[serde(default)]
    pub authentication: Option<Value>,
}

impl LabelDefinition {
    pub fn validate(&self) -> Result<(), String> {
        if self.driver.is_empty() {
            return Err("definition.driver must not be empty".into());
        }
        self.resources.validate()?;
        for image in &self.images {
            image.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub uid: Uid,
    pub name: String,
    pub version: u32,
    pub definitions: Vec<LabelDefinition>,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Label {
    /// A version-0 label is a mutable draft; version > 0 is immutable
    /// value-log semantics (§3).
    pub fn is_draft(&self) -> bool {
        self.version == 0
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("label name must not be empty".into());
        }
        if self.definitions.is_empty() {
            return Err("label must have at least one definition".into());
        }
        for def in &self.definitions {
            def.validate()?;
        }
        Ok(())
    }
}
