use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::uid::Uid;

/// The concrete, externally-materialized environment for one application.
/// Exists at most once per application; owned by exactly one node
/// (`node_uid`) — only that node mutates it (§3, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationResource {
    pub uid: Uid,
    pub application_uid: Uid,
    pub label_uid: Uid,
    pub node_uid: Uid,
    /// Name of the `LabelDefinition.driver` this resource was allocated
    /// through, so the scheduler and deallocation path know which
    /// `ProviderDriver` owns it without re-deriving it from the label.
    pub driver: String,
    /// Driver-scoped identifier (e.g. container id, instance id).
    pub identifier: String,
    pub hw_addr: Option<String>,
    pub ip_addr: Option<String>,
    #[serde(default)]
    pub authentication: Option<Value>,
    pub timeout: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationResource {
    pub fn is_past_timeout(&self, now: DateTime<Utc>) -> bool {
        self.timeout.map(|t| now > t).unwrap_or(false)
    }
}
