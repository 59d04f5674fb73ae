//! GraphQL surface (§6.2): a thin, typed layer over the core engine.
//! Mirrors the teacher's `graphql::{types, mutations, subscriptions}` split
//! except the teacher has no query root of its own (`EmptyMutation` there,
//! queries live directly on `QueryRoot`) — here both query and mutation
//! roots are real, since C6/C3 expose mutating operations the transport
//! has to surface.

pub mod mutations;
pub mod queries;
pub mod subscriptions;
pub mod types;

use async_graphql::Schema;

pub use mutations::MutationRoot;
pub use queries::QueryRoot;
pub use subscriptions::SubscriptionRoot;

pub type FishSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

pub fn build_schema() -> FishSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot).finish()
}
