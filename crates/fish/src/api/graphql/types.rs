//! GraphQL-facing mirrors of the core model (§6.2). Kept as a separate
//! layer rather than deriving `SimpleObject` directly on `crate::model`
//! types, the way the teacher keeps `graphql::types::agent` distinct from
//! the gRPC-generated agent types it wraps.

use async_graphql::{Enum, Json, SimpleObject};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model;

#[derive(Clone, Copy, PartialEq, Eq, Enum)]
pub enum ChangeTypeGql {
    Created,
    Updated,
    Removed,
}

impl From<model::ChangeType> for ChangeTypeGql {
    fn from(c: model::ChangeType) -> Self {
        match c {
            model::ChangeType::Created => ChangeTypeGql::Created,
            model::ChangeType::Updated => ChangeTypeGql::Updated,
            model::ChangeType::Removed => ChangeTypeGql::Removed,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Enum)]
pub enum StatusGql {
    New,
    Elected,
    Allocated,
    Deallocate,
    Deallocated,
    Error,
}

impl From<model::Status> for StatusGql {
    fn from(s: model::Status) -> Self {
        match s {
            model::Status::New => StatusGql::New,
            model::Status::Elected => StatusGql::Elected,
            model::Status::Allocated => StatusGql::Allocated,
            model::Status::Deallocate => StatusGql::Deallocate,
            model::Status::Deallocated => StatusGql::Deallocated,
            model::Status::Error => StatusGql::Error,
        }
    }
}

impl From<StatusGql> for model::Status {
    fn from(s: StatusGql) -> Self {
        match s {
            StatusGql::New => model::Status::New,
            StatusGql::Elected => model::Status::Elected,
            StatusGql::Allocated => model::Status::Allocated,
            StatusGql::Deallocate => model::Status::Deallocate,
            StatusGql::Deallocated => model::Status::Deallocated,
            StatusGql::Error => model::Status::Error,
        }
    }
}

macro_rules! uid_field {
    ($v:expr) => {
        $v.to_string()
    };
}

#[derive(Clone, SimpleObject)]
pub struct NodeGql {
    pub uid: String,
    pub name: String,
    pub address: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<model::Node> for NodeGql {
    fn from(n: model::Node) -> Self {
        Self {
            uid: uid_field!(n.uid),
            name: n.name,
            address: n.address,
            location: n.location,
            created_at: n.created_at,
            updated_at: n.updated_at,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct LabelGql {
    pub uid: String,
    pub name: String,
    pub version: i32,
    pub metadata: Json<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<model::Label> for LabelGql {
    fn from(l: model::Label) -> Self {
        Self {
            uid: uid_field!(l.uid),
            name: l.name,
            version: l.version as i32,
            metadata: Json(l.metadata),
            created_at: l.created_at,
            updated_at: l.updated_at,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct ApplicationGql {
    pub uid: String,
    pub label_uid: String,
    pub owner_name: String,
    pub metadata: Json<Value>,
    pub created_at: DateTime<Utc>,
}

impl From<model::Application> for ApplicationGql {
    fn from(a: model::Application) -> Self {
        Self {
            uid: uid_field!(a.uid),
            label_uid: uid_field!(a.label_uid),
            owner_name: a.owner_name,
            metadata: Json(a.metadata),
            created_at: a.created_at,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct ApplicationStateGql {
    pub uid: String,
    pub application_uid: String,
    pub status: StatusGql,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<model::ApplicationState> for ApplicationStateGql {
    fn from(s: model::ApplicationState) -> Self {
        Self {
            uid: uid_field!(s.uid),
            application_uid: uid_field!(s.application_uid),
            status: s.status.into(),
            description: s.description,
            created_at: s.created_at,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct ApplicationResourceGql {
    pub uid: String,
    pub application_uid: String,
    pub node_uid: String,
    pub driver: String,
    pub identifier: String,
    pub ip_addr: Option<String>,
    pub timeout: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<model::ApplicationResource> for ApplicationResourceGql {
    fn from(r: model::ApplicationResource) -> Self {
        Self {
            uid: uid_field!(r.uid),
            application_uid: uid_field!(r.application_uid),
            node_uid: uid_field!(r.node_uid),
            driver: r.driver,
            identifier: r.identifier,
            ip_addr: r.ip_addr,
            timeout: r.timeout,
            created_at: r.created_at,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct ApplicationTaskGql {
    pub uid: String,
    pub application_uid: String,
    pub task: String,
    pub when: StatusGql,
    pub result: Option<Json<Value>>,
    pub created_at: DateTime<Utc>,
}

impl From<model::ApplicationTask> for ApplicationTaskGql {
    fn from(t: model::ApplicationTask) -> Self {
        Self {
            uid: uid_field!(t.uid),
            application_uid: uid_field!(t.application_uid),
            task: t.task,
            when: t.when.into(),
            result: t.result.map(Json),
            created_at: t.created_at,
        }
    }
}

#[derive(Clone, SimpleObject)]
pub struct RoleGql {
    pub uid: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<model::Role> for RoleGql {
    fn from(r: model::Role) -> Self {
        Self {
            uid: uid_field!(r.uid),
            name: r.name,
            created_at: r.created_at,
        }
    }
}

/// Generic `(ChangeType, T)` envelope for every subscription stream
/// (§4.1's six subscribable kinds share this shape).
#[derive(SimpleObject)]
#[graphql(concrete(name = "NodeChange", params(NodeGql)))]
#[graphql(concrete(name = "LabelChange", params(LabelGql)))]
#[graphql(concrete(name = "RoleChange", params(RoleGql)))]
#[graphql(concrete(name = "ApplicationStateChange", params(ApplicationStateGql)))]
#[graphql(concrete(name = "ApplicationTaskChange", params(ApplicationTaskGql)))]
#[graphql(concrete(name = "ApplicationResourceChange", params(ApplicationResourceGql)))]
pub struct ChangeEventGql<T: async_graphql::OutputType> {
    pub change: ChangeTypeGql,
    pub object: T,
}
