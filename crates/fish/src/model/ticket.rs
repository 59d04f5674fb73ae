use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uid::Uid;

/// Single-use credential tied to an allocated resource. `key_or_hash` holds
/// either a password hash or a public-key string, matched opaquely by
/// `AccessConsume` (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTicket {
    pub uid: Uid,
    pub application_resource_uid: Uid,
    pub username: String,
    pub key_or_hash: String,
    pub created_at: DateTime<Utc>,
}
