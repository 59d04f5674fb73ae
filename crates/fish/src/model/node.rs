use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::uid::Uid;

/// A node definition: host spec advertised to the rest of the cluster for
/// informational/capacity-planning purposes (not validated by the core).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub host: String,
    #[serde(default)]
    pub cpu: Vec<String>,
    pub memory: u64,
    #[serde(default)]
    pub disks: Vec<String>,
    #[serde(default)]
    pub nets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub uid: Uid,
    pub name: String,
    pub address: String,
    /// SHA-256 of the node's TLS public key, hex-encoded. Immutable after
    /// first set (§4.2) — `pubkey` never changes for a given `name`.
    pub pubkey: String,
    pub location: String,
    pub definition: NodeDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Node {
    pub fn is_active(&self, now: DateTime<Utc>, ping_interval: chrono::Duration) -> bool {
        now - self.updated_at <= ping_interval * 2
    }
}
