//! C8 — single-use access tickets (§4.8).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::error;

use crate::error::{FishError, FishResult};
use crate::model::{AccessTicket, ObjectKind};
use crate::store::{Collection, Store};
use crate::uid::Uid;

pub struct TicketOffice {
    store: Arc<Store>,
    node_prefix: [u8; 6],
    /// Guards the read-then-delete pair so two concurrent `Consume` calls
    /// for the same credentials can't both observe the ticket before
    /// either deletes it (§4.8, §9 design notes: "reject the connection
    /// if the delete step fails").
    consume_lock: Mutex<()>,
}

impl TicketOffice {
    pub fn new(store: Arc<Store>, node_prefix: [u8; 6]) -> Self {
        Self {
            store,
            node_prefix,
            consume_lock: Mutex::new(()),
        }
    }

    fn collection(&self) -> Collection<AccessTicket> {
        Collection::new(&self.store, ObjectKind::AccessTicket)
    }

    pub fn create(
        &self,
        resource_uid: Uid,
        username: &str,
        key_or_hash: &str,
    ) -> FishResult<AccessTicket> {
        if username.is_empty() || key_or_hash.is_empty() {
            return Err(FishError::Validation(
                "username and key_or_hash must not be empty".into(),
            ));
        }
        let ticket = AccessTicket {
            uid: Uid::new(&self.node_prefix),
            application_resource_uid: resource_uid,
            username: username.to_string(),
            key_or_hash: key_or_hash.to_string(),
            created_at: Utc::now(),
        };
        self.collection().add(&ticket.uid.to_string(), &ticket)?;
        Ok(ticket)
    }

    /// Matches on `(username, key_or_hash)`, then deletes the ticket
    /// atomically with respect to other `consume` calls. A delete failure
    /// is logged but the ticket is still reported consumed — the caller
    /// must treat a returned record as spent even if cleanup lagged
    /// (§4.8).
    pub async fn consume(&self, username: &str, key_or_hash: &str) -> FishResult<AccessTicket> {
        let _guard = self.consume_lock.lock().await;

        let mut found: Option<AccessTicket> = None;
        self.collection().scan("", |t: &AccessTicket| {
            if t.username == username && t.key_or_hash == key_or_hash {
                found = Some(t.clone());
                false
            } else {
                true
            }
        })?;

        let ticket = found.ok_or_else(|| FishError::NotFound("access ticket".into()))?;
        if let Err(e) = self.collection().delete(&ticket.uid.to_string()) {
            error!(uid = %ticket.uid, error = %e, "failed to delete consumed ticket; treating as spent anyway");
        }
        Ok(ticket)
    }

    pub fn delete_by_resource(&self, resource_uid: Uid) -> FishResult<()> {
        let mut to_delete = Vec::new();
        self.collection().scan("", |t: &AccessTicket| {
            if t.application_resource_uid == resource_uid {
                to_delete.push(t.uid);
            }
            true
        })?;
        for uid in to_delete {
            self.collection().delete(&uid.to_string())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn office() -> TicketOffice {
        TicketOffice::new(Arc::new(Store::open_temporary().unwrap()), [0; 6])
    }

    #[tokio::test]
    async fn consume_is_single_use() {
        let office = office();
        let resource = Uid::new(&[0; 6]);
        office.create(resource, "root", "hash1").unwrap();

        let first = office.consume("root", "hash1").await;
        assert!(first.is_ok());

        let second = office.consume("root", "hash1").await;
        assert!(matches!(second, Err(FishError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_by_resource_cascades() {
        let office = office();
        let resource = Uid::new(&[0; 6]);
        office.create(resource, "a", "h1").unwrap();
        office.create(resource, "b", "h2").unwrap();

        office.delete_by_resource(resource).unwrap();

        assert!(office.consume("a", "h1").await.is_err());
        assert!(office.consume("b", "h2").await.is_err());
    }
}
