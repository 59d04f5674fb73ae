use async_graphql::{Context, Object, Result};
use serde_json::Value;

use crate::api::AppState;
use crate::model::Label;
use crate::uid::Uid;

use super::types::{ApplicationGql, LabelGql};

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// `ApplicationCreate` (§4.6.1, §6.2).
    async fn create_application(
        &self,
        ctx: &Context<'_>,
        label_uid: String,
        owner_name: String,
        metadata: Option<async_graphql::Json<Value>>,
    ) -> Result<ApplicationGql> {
        let state = ctx.data::<AppState>()?;
        let label_uid: Uid = label_uid
            .parse()
            .map_err(|_| async_graphql::Error::new("invalid label uid"))?;
        let metadata = metadata.map(|j| j.0).unwrap_or(Value::Null);
        Ok(state
            .engine
            .create(label_uid, &owner_name, metadata)
            .map_err(|e| e.extend())?
            .into())
    }

    /// `ApplicationDeallocate` (§4.6.3, §6.2).
    async fn deallocate_application(
        &self,
        ctx: &Context<'_>,
        uid: String,
        requestor: String,
    ) -> Result<bool> {
        let state = ctx.data::<AppState>()?;
        let uid: Uid = uid
            .parse()
            .map_err(|_| async_graphql::Error::new("invalid uid"))?;
        state
            .engine
            .deallocate(uid, &requestor)
            .map_err(|e| e.extend())?;
        Ok(true)
    }

    /// `LabelCreate` (§4.3, §6.2). `version` must be `0` for a mutable
    /// draft or the caller's next intended version; the catalog rejects
    /// collisions.
    async fn create_label(
        &self,
        ctx: &Context<'_>,
        name: String,
        version: u32,
        definitions: async_graphql::Json<Value>,
        metadata: Option<async_graphql::Json<Value>>,
    ) -> Result<LabelGql> {
        let state = ctx.data::<AppState>()?;
        let definitions = serde_json::from_value(definitions.0)
            .map_err(|e| async_graphql::Error::new(format!("invalid definitions: {e}")))?;
        let now = crate::model::now();
        let label = Label {
            uid: Uid::new(&state.identity.uid().node_prefix()),
            name,
            version,
            definitions,
            metadata: metadata.map(|j| j.0).unwrap_or(Value::Null),
            created_at: now,
            updated_at: now,
        };
        Ok(state.catalog.create(label).await.map_err(|e| e.extend())?.into())
    }

    /// `LabelDelete` (§4.3, §6.2).
    async fn delete_label(&self, ctx: &Context<'_>, uid: String) -> Result<bool> {
        let state = ctx.data::<AppState>()?;
        let uid: Uid = uid
            .parse()
            .map_err(|_| async_graphql::Error::new("invalid uid"))?;
        state.catalog.delete(uid).await.map_err(|e| e.extend())?;
        Ok(true)
    }
}
