use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uid::Uid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    New,
    Elected,
    Allocated,
    Deallocate,
    Deallocated,
    Error,
}

impl Status {
    /// Active unless dead (§4.6).
    pub fn is_active(self) -> bool {
        !self.is_dead()
    }

    pub fn is_dead(self) -> bool {
        matches!(self, Status::Deallocated | Status::Error)
    }
}

/// Append-only; the application's *current* state is the latest by
/// `created_at`. Never mutated or deleted individually (cascades with the
/// owning Application).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationState {
    pub uid: Uid,
    pub application_uid: Uid,
    pub status: Status,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}
