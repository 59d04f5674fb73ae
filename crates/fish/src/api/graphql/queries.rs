use async_graphql::{Context, Object, Result};

use crate::api::AppState;

use super::types::{ApplicationGql, LabelGql, NodeGql};

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn health(&self) -> &str {
        "ok"
    }

    async fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn applications(&self, ctx: &Context<'_>) -> Result<Vec<ApplicationGql>> {
        let state = ctx.data::<AppState>()?;
        Ok(state
            .engine
            .list()
            .map_err(|e| e.extend())?
            .into_iter()
            .map(ApplicationGql::from)
            .collect())
    }

    async fn application(&self, ctx: &Context<'_>, uid: String) -> Result<ApplicationGql> {
        let state = ctx.data::<AppState>()?;
        let uid = uid
            .parse()
            .map_err(|_| async_graphql::Error::new("invalid uid"))?;
        Ok(state.engine.get(uid).map_err(|e| e.extend())?.into())
    }

    async fn labels(
        &self,
        ctx: &Context<'_>,
        name: Option<String>,
        version: Option<String>,
    ) -> Result<Vec<LabelGql>> {
        let state = ctx.data::<AppState>()?;
        Ok(state
            .catalog
            .list(name.as_deref(), version.as_deref())
            .map_err(|e| e.extend())?
            .into_iter()
            .map(LabelGql::from)
            .collect())
    }

    async fn label(&self, ctx: &Context<'_>, uid: String) -> Result<LabelGql> {
        let state = ctx.data::<AppState>()?;
        let uid = uid
            .parse()
            .map_err(|_| async_graphql::Error::new("invalid uid"))?;
        Ok(state.catalog.get(uid).map_err(|e| e.extend())?.into())
    }

    async fn nodes(&self, ctx: &Context<'_>) -> Result<Vec<NodeGql>> {
        let state = ctx.data::<AppState>()?;
        Ok(state
            .identity
            .active_nodes()
            .map_err(|e| e.extend())?
            .into_iter()
            .map(NodeGql::from)
            .collect())
    }

    /// The node answering this query (§4.2) — handy for a client to confirm
    /// which peer it's talking to.
    async fn this_node(&self, ctx: &Context<'_>) -> Result<NodeGql> {
        let state = ctx.data::<AppState>()?;
        Ok(state.identity.self_node.clone().into())
    }
}
