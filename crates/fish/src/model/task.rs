use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Status;
use crate::uid::Uid;

/// Fires once, the first time the application's current status reaches
/// `when` (§4.7). `result = None` means not yet run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationTask {
    pub uid: Uid,
    pub application_uid: Uid,
    pub task: String,
    pub when: Status,
    #[serde(default)]
    pub options: Value,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationTask {
    pub fn is_pending(&self) -> bool {
        self.result.is_none()
    }
}
