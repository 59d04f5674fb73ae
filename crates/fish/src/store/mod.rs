//! C1 — the append-only, namespaced key/value store (§4.1). Backed by
//! `sled`, whose merge/compaction/on-disk format is the "black box" the
//! spec says this layer must not reach into.

mod backend;
mod subscribe;

pub use backend::Store;
pub use subscribe::{ChangeEvent, RecvOutcome, Subscription};

use crate::error::FishResult;
use crate::model::ObjectKind;
use serde::{de::DeserializeOwned, Serialize};

/// Typed convenience wrapper over a single collection, used by every
/// higher component instead of juggling raw JSON + collection name pairs.
pub struct Collection<'s, T> {
    store: &'s Store,
    kind: ObjectKind,
    _marker: std::marker::PhantomData<T>,
}

impl<'s, T> Collection<'s, T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn new(store: &'s Store, kind: ObjectKind) -> Self {
        Self {
            store,
            kind,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn add(&self, key: &str, value: &T) -> FishResult<()> {
        self.store.add_raw(self.kind, key, value)
    }

    pub fn get(&self, key: &str) -> FishResult<T> {
        self.store.get_raw(self.kind, key)
    }

    pub fn try_get(&self, key: &str) -> FishResult<Option<T>> {
        match self.get(key) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn list(&self) -> FishResult<Vec<T>> {
        self.store.list_raw(self.kind)
    }

    pub fn delete(&self, key: &str) -> FishResult<()> {
        self.store.delete_raw(self.kind, key)
    }

    pub fn has(&self, key: &str) -> FishResult<bool> {
        self.store.has_raw(self.kind, key)
    }

    pub fn scan(&self, prefix: &str, mut f: impl FnMut(&T) -> bool) -> FishResult<()> {
        self.store.scan_raw(self.kind, prefix, &mut f)
    }

    pub fn subscribe(&self) -> Subscription<T> {
        self.store.subscribe_raw(self.kind)
    }
}
