use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::uid::Uid;

/// A user or gate request for an environment matching a Label. Immutable
/// after creation — there is no `ApplicationSave`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub uid: Uid,
    pub label_uid: Uid,
    pub owner_name: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
