use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uid::Uid;

/// Per-node bid for an election round. Each node writes at most one per
/// `(application_uid, round)`; the engine reads the set for the round and
/// applies the tie-break rule of §4.6.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub uid: Uid,
    pub application_uid: Uid,
    pub node_uid: Uid,
    pub round: u32,
    /// Slots the voting node believes it could allocate; `-1` means the
    /// driver could not currently report (treated as a non-bid).
    pub available: i64,
    pub created_at: DateTime<Utc>,
}
