//! Non-blocking fan-out. Dispatch never waits on a subscriber: each one
//! gets a bounded broadcast channel, and a lagging/closed subscriber only
//! drops events for itself (§4.1, §9 design notes). Subscribe/unsubscribe
//! uses a lock separate from the backend lock so a slow reader can never
//! deadlock a writer.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::{ChangeType, ObjectKind};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct ChangeEvent {
    pub change: ChangeType,
    pub payload: Value,
}

pub struct SubscriptionRegistry {
    channels: RwLock<HashMap<ObjectKind, broadcast::Sender<ChangeEvent>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender_for(&self, kind: ObjectKind) -> broadcast::Sender<ChangeEvent> {
        if let Some(tx) = self.channels.read().get(&kind) {
            return tx.clone();
        }
        let mut channels = self.channels.write();
        channels
            .entry(kind)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Best-effort publish. A full channel silently drops the oldest event
    /// for slow subscribers (broadcast semantics); there being zero
    /// subscribers is not an error.
    pub fn publish(&self, kind: ObjectKind, event: ChangeEvent) {
        let tx = self.sender_for(kind);
        // `send` only errors when there are no receivers at all, which is
        // the common case and not worth logging.
        let _ = tx.send(event);
    }

    pub fn subscribe<T>(&self, kind: ObjectKind) -> Subscription<T> {
        let rx = self.sender_for(kind).subscribe();
        Subscription {
            inner: rx,
            _marker: std::marker::PhantomData,
        }
    }
}

/// A typed handle to one subscriber's stream. Subscribers must treat this
/// as a change *hint* and reconcile via `List` when needed — a lagged
/// receiver silently skips ahead rather than erroring.
pub struct Subscription<T> {
    inner: broadcast::Receiver<ChangeEvent>,
    _marker: std::marker::PhantomData<T>,
}

pub enum RecvOutcome<T> {
    Event(ChangeType, T),
    /// Some events were dropped because this subscriber fell behind;
    /// callers should reconcile via `List`.
    Lagged,
    Closed,
}

impl<T: DeserializeOwned> Subscription<T> {
    pub async fn recv(&mut self) -> RecvOutcome<T> {
        loop {
            match self.inner.recv().await {
                Ok(event) => match serde_json::from_value::<T>(event.payload) {
                    Ok(value) => return RecvOutcome::Event(event.change, value),
                    Err(e) => {
                        debug!(error = %e, "dropping undecodable change event for this subscriber");
                        continue;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged, events dropped");
                    return RecvOutcome::Lagged;
                }
                Err(broadcast::error::RecvError::Closed) => return RecvOutcome::Closed,
            }
        }
    }
}
