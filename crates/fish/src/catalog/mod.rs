//! C3 — immutable (per version) Label catalog (§4.3).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{FishError, FishResult};
use crate::model::{ChangeType, Label, ObjectKind};
use crate::store::{Collection, Store};
use crate::uid::Uid;

/// Serializes the "is (name, version) unique" check against concurrent
/// creators. The store itself permits concurrent writers; uniqueness is
/// the catalog's job, not the store's (§4.3).
pub struct Catalog {
    store: Arc<Store>,
    write_lock: Mutex<()>,
}

impl Catalog {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    fn collection(&self) -> Collection<Label> {
        Collection::new(&self.store, ObjectKind::Label)
    }

    pub async fn create(&self, mut label: Label) -> FishResult<Label> {
        label.validate().map_err(FishError::Validation)?;

        let _guard = self.write_lock.lock().await;
        let exists = self
            .collection()
            .list()?
            .into_iter()
            .any(|l| l.name == label.name && l.version == label.version);
        if exists {
            return Err(FishError::Validation(format!(
                "label {}:{} already exists",
                label.name, label.version
            )));
        }

        let now = Utc::now();
        label.created_at = now;
        label.updated_at = now;
        self.collection().add(&label.uid.to_string(), &label)?;
        Ok(label)
    }

    /// Succeeds only when `version == 0` (§4.3, §7 StateError otherwise).
    pub async fn save(&self, label: Label) -> FishResult<Label> {
        let _guard = self.write_lock.lock().await;
        let existing = self.collection().get(&label.uid.to_string())?;
        if existing.version != 0 {
            return Err(FishError::State(format!(
                "label {} is version {} and immutable",
                existing.name, existing.version
            )));
        }
        label.validate().map_err(FishError::Validation)?;
        let mut updated = label;
        updated.updated_at = Utc::now();
        self.collection().add(&updated.uid.to_string(), &updated)?;
        Ok(updated)
    }

    pub fn get(&self, uid: Uid) -> FishResult<Label> {
        self.collection().get(&uid.to_string())
    }

    pub async fn delete(&self, uid: Uid) -> FishResult<()> {
        let _guard = self.write_lock.lock().await;
        self.collection().delete(&uid.to_string())
    }

    /// `version = Some("last")` collapses per-name to the highest version
    /// seen (§4.3).
    pub fn list(&self, name: Option<&str>, version: Option<&str>) -> FishResult<Vec<Label>> {
        let mut labels = self.collection().list()?;
        if let Some(name) = name {
            labels.retain(|l| l.name == name);
        }

        match version {
            None => Ok(labels),
            Some("last") => {
                let mut latest: HashMap<String, Label> = HashMap::new();
                for label in labels {
                    latest
                        .entry(label.name.clone())
                        .and_modify(|existing| {
                            if label.version > existing.version {
                                *existing = label.clone();
                            }
                        })
                        .or_insert(label);
                }
                Ok(latest.into_values().collect())
            }
            Some(v) => {
                let version: u32 = v
                    .parse()
                    .map_err(|_| FishError::Validation(format!("invalid version filter {v:?}")))?;
                labels.retain(|l| l.version == version);
                Ok(labels)
            }
        }
    }

    pub fn subscribe(&self) -> crate::store::Subscription<Label> {
        self.collection().subscribe()
    }
}

/// Re-exported for modules that only need to react to label churn (e.g. a
/// driver warming an image cache) without depending on the catalog type.
pub type LabelChange = (ChangeType, Label);
