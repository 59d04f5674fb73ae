//! Entities of §3, one file each. All are plain serde-encoded structs —
//! the store treats them as opaque JSON payloads keyed by `uid`.

pub mod application;
pub mod label;
pub mod node;
pub mod resource;
pub mod role;
pub mod state;
pub mod task;
pub mod ticket;
pub mod vote;

pub use application::Application;
pub use label::{Label, LabelDefinition, Resources};
pub use node::{Node, NodeDefinition};
pub use resource::ApplicationResource;
pub use role::{Permission, Role};
pub use state::{ApplicationState, Status};
pub use task::ApplicationTask;
pub use ticket::AccessTicket;
pub use vote::Vote;

use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// The six kinds the store notifies subscribers about (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Node,
    Label,
    Application,
    ApplicationState,
    ApplicationTask,
    ApplicationResource,
    Role,
    AccessTicket,
    Vote,
    /// At-most-once webhook delivery dedup ledger (§4.9.1). Internal
    /// bookkeeping, not one of the core entities of §3.
    WebhookDelivery,
    /// Job -> Application mapping for the gate bridge (§4.9.2).
    GateJob,
}

impl ObjectKind {
    pub fn collection(self) -> &'static str {
        match self {
            ObjectKind::Node => "Node",
            ObjectKind::Label => "Label",
            ObjectKind::Application => "Application",
            ObjectKind::ApplicationState => "ApplicationState",
            ObjectKind::ApplicationTask => "ApplicationTask",
            ObjectKind::ApplicationResource => "ApplicationResource",
            ObjectKind::Role => "Role",
            ObjectKind::AccessTicket => "AccessTicket",
            ObjectKind::Vote => "Vote",
            ObjectKind::WebhookDelivery => "WebhookDelivery",
            ObjectKind::GateJob => "GateJob",
        }
    }

    /// Subset of kinds the store exposes `Subscribe`/`Unsubscribe` for (§4.1).
    pub const SUBSCRIBABLE: [ObjectKind; 6] = [
        ObjectKind::ApplicationState,
        ObjectKind::ApplicationTask,
        ObjectKind::ApplicationResource,
        ObjectKind::Label,
        ObjectKind::Role,
        ObjectKind::Node,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Created,
    Updated,
    Removed,
}
