//! C2 — node self-identity, heartbeat, and the active-peer set (§4.2).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{FishError, FishResult};
use crate::model::{ChangeType, Node, NodeDefinition, ObjectKind};
use crate::store::{Collection, Store};
use crate::uid::Uid;

pub struct NodeRegistry {
    store: Arc<Store>,
    pub self_node: Node,
    ping_interval: chrono::Duration,
}

impl NodeRegistry {
    /// Derive this node's uid deterministically from the SHA-256 of its TLS
    /// public key (DER bytes of the leaf certificate), so the same keypair
    /// always yields the same uid across restarts (§4.2, §9 design notes).
    pub fn derive_uid_from_cert(cert_der: &[u8]) -> Uid {
        let digest = Sha256::digest(cert_der);
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uid(bytes)
    }

    pub fn pubkey_fingerprint(cert_der: &[u8]) -> String {
        let digest = Sha256::digest(cert_der);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Bootstrap (or rejoin) this node's identity. If `name` is already
    /// registered with a different pubkey, this is a hard error (§4.2) —
    /// identity rotation requires a new name, not an overwrite.
    pub fn bootstrap(
        store: Arc<Store>,
        name: &str,
        address: &str,
        location: &str,
        definition: NodeDefinition,
        cert_der: &[u8],
        ping_interval_secs: u64,
    ) -> FishResult<Self> {
        let nodes: Collection<Node> = Collection::new(&store, ObjectKind::Node);
        let pubkey = Self::pubkey_fingerprint(cert_der);
        let uid = Self::derive_uid_from_cert(cert_der);
        let now = Utc::now();

        let self_node = match nodes.try_get(name)? {
            Some(existing) => {
                if existing.pubkey != pubkey {
                    return Err(FishError::FatalStartup(format!(
                        "node {name:?} is already registered with a different public key; \
                         rotate identity by registering under a new name instead"
                    )));
                }
                let mut updated = existing;
                updated.address = address.to_string();
                updated.location = location.to_string();
                updated.definition = definition;
                updated.updated_at = now;
                nodes.add(name, &updated)?;
                updated
            }
            None => {
                let node = Node {
                    uid,
                    name: name.to_string(),
                    address: address.to_string(),
                    pubkey,
                    location: location.to_string(),
                    definition,
                    created_at: now,
                    updated_at: now,
                    metadata: Default::default(),
                };
                nodes.add(name, &node)?;
                node
            }
        };

        Ok(Self {
            store,
            self_node,
            ping_interval: chrono::Duration::seconds(ping_interval_secs as i64),
        })
    }

    pub fn uid(&self) -> Uid {
        self.self_node.uid
    }

    pub fn ping_interval(&self) -> chrono::Duration {
        self.ping_interval
    }

    /// Updates `updated_at` on this node's own record. Ping failure is
    /// logged but never fatal: a node that can't reach the store for its
    /// own heartbeat still keeps the allocations it currently owns (§4.2).
    pub fn ping(&self) -> FishResult<()> {
        let nodes: Collection<Node> = Collection::new(&self.store, ObjectKind::Node);
        let mut node = nodes.get(&self.self_node.name)?;
        node.updated_at = Utc::now();
        nodes.add(&self.self_node.name, &node)
    }

    pub fn active_nodes(&self) -> FishResult<Vec<Node>> {
        let nodes: Collection<Node> = Collection::new(&self.store, ObjectKind::Node);
        let now = Utc::now();
        Ok(nodes
            .list()?
            .into_iter()
            .filter(|n| n.is_active(now, self.ping_interval))
            .collect())
    }

    pub fn is_active(&self, uid: Uid) -> FishResult<bool> {
        Ok(self.active_nodes()?.iter().any(|n| n.uid == uid))
    }

    pub fn spawn_ping_loop(self: &Arc<Self>, shutdown: crate::engine::ShutdownGroup) {
        let registry = self.clone();
        let interval = Duration::from_secs(registry.ping_interval.num_seconds().max(1) as u64);
        shutdown.spawn("node-ping", move |mut stop| async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = registry.ping() {
                            warn!(error = %e, "self-ping failed");
                        }
                    }
                    _ = stop.changed() => {
                        info!("node ping loop shutting down");
                        break;
                    }
                }
            }
        });
    }
}

/// `ChangeType` is re-exported here purely so driver/gate modules that only
/// care about node churn don't need to reach into `crate::model` directly.
pub use ChangeType as NodeChangeType;
