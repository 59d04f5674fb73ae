use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::subscribe::{ChangeEvent, SubscriptionRegistry};
use crate::error::{FishError, FishResult};
use crate::model::{ChangeType, ObjectKind};

/// Namespaced append/get/list/delete/scan over sled, with periodic
/// compaction under an exclusive lock and a separately-locked
/// subscription registry (§4.1, §5 — two locks, never nested the wrong
/// way so a slow subscriber can never block a writer).
pub struct Store {
    db: sled::Db,
    /// Shared for ordinary reads/writes, exclusive for `Compact()`.
    backend_lock: RwLock<()>,
    subscriptions: SubscriptionRegistry,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> FishResult<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            backend_lock: RwLock::new(()),
            subscriptions: SubscriptionRegistry::new(),
        })
    }

    #[cfg(test)]
    pub fn open_temporary() -> FishResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            backend_lock: RwLock::new(()),
            subscriptions: SubscriptionRegistry::new(),
        })
    }

    fn tree(&self, kind: ObjectKind) -> FishResult<sled::Tree> {
        Ok(self.db.open_tree(kind.collection())?)
    }

    pub fn add_raw<T: Serialize + Clone>(
        &self,
        kind: ObjectKind,
        key: &str,
        value: &T,
    ) -> FishResult<()> {
        if key.contains('/') {
            return Err(FishError::Validation(format!(
                "key {key:?} must not contain '/'"
            )));
        }
        let _guard = self.backend_lock.read();
        let tree = self.tree(kind)?;
        let bytes = serde_json::to_vec(value)
            .map_err(|e| FishError::Validation(format!("encode failed: {e}")))?;
        let previous = tree.insert(key.as_bytes(), bytes)?;
        drop(_guard);

        let change = if previous.is_some() {
            ChangeType::Updated
        } else {
            ChangeType::Created
        };
        self.notify(kind, change, value);
        Ok(())
    }

    pub fn get_raw<T: DeserializeOwned>(&self, kind: ObjectKind, key: &str) -> FishResult<T> {
        let _guard = self.backend_lock.read();
        let tree = self.tree(kind)?;
        match tree.get(key.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| FishError::Validation(format!("decode failed: {e}"))),
            None => Err(FishError::NotFound(format!(
                "{}:{key}",
                kind.collection()
            ))),
        }
    }

    pub fn list_raw<T: DeserializeOwned>(&self, kind: ObjectKind) -> FishResult<Vec<T>> {
        let _guard = self.backend_lock.read();
        let tree = self.tree(kind)?;
        let mut out = Vec::new();
        for entry in tree.iter() {
            let (_, bytes) = entry?;
            match serde_json::from_slice(&bytes) {
                Ok(v) => out.push(v),
                Err(e) => warn!(collection = kind.collection(), error = %e, "skipping undecodable row"),
            }
        }
        Ok(out)
    }

    pub fn delete_raw<T: DeserializeOwned + Serialize + Clone>(
        &self,
        kind: ObjectKind,
        key: &str,
    ) -> FishResult<()> {
        let _guard = self.backend_lock.read();
        let tree = self.tree(kind)?;
        let previous = tree.remove(key.as_bytes())?;
        drop(_guard);

        if let Some(bytes) = previous {
            if let Ok(value) = serde_json::from_slice::<T>(&bytes) {
                self.notify(kind, ChangeType::Removed, &value);
            }
        }
        Ok(())
    }

    pub fn has_raw(&self, kind: ObjectKind, key: &str) -> FishResult<bool> {
        let _guard = self.backend_lock.read();
        Ok(self.tree(kind)?.contains_key(key.as_bytes())?)
    }

    /// Iterate keys under `prefix`; `f` may return `false` to stop early.
    /// Keys containing `/` are excluded (reserved separator, §4.1).
    pub fn scan_raw<T: DeserializeOwned>(
        &self,
        kind: ObjectKind,
        prefix: &str,
        f: &mut dyn FnMut(&T) -> bool,
    ) -> FishResult<()> {
        let _guard = self.backend_lock.read();
        let tree = self.tree(kind)?;
        for entry in tree.scan_prefix(prefix.as_bytes()) {
            let (key, bytes) = entry?;
            let key_str = String::from_utf8_lossy(&key);
            if key_str.contains('/') {
                continue;
            }
            let value: T = match serde_json::from_slice(&bytes) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if !f(&value) {
                break;
            }
        }
        Ok(())
    }

    /// Rewrites the log to drop superseded entries. Holds the exclusive
    /// lock for the duration; idempotent and safe to interrupt (§4.1, §8
    /// property 8).
    pub fn compact(&self) -> FishResult<()> {
        let _guard = self.backend_lock.write();
        debug!("compaction starting");
        self.db.flush()?;
        // sled manages its own log-structured compaction internally on
        // flush; holding the exclusive lock here is what gives callers the
        // "no concurrent writers during compaction" guarantee the spec
        // requires, even though the backend performs it lazily.
        debug!("compaction complete");
        Ok(())
    }

    pub fn subscribe_raw<T>(&self, kind: ObjectKind) -> super::subscribe::Subscription<T> {
        self.subscriptions.subscribe(kind)
    }

    fn notify<T: Serialize + Clone>(&self, kind: ObjectKind, change: ChangeType, value: &T) {
        let payload = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to encode change notification payload");
                return;
            }
        };
        self.subscriptions.publish(kind, ChangeEvent { change, payload });
    }
}
