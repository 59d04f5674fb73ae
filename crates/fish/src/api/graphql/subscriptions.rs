//! Subscription root streaming the six kinds the store fans out to
//! subscribers (`ObjectKind::SUBSCRIBABLE`, §4.1). Each field wraps a
//! `store::Subscription<T>` in a `Stream` via `stream_changes`, skipping
//! lagged notifications rather than erroring the whole stream — a lagged
//! subscriber reconciles by re-querying, same as any other client (§4.1).

use async_graphql::{Context, Result, Subscription};
use futures::{stream, Stream};
use serde::de::DeserializeOwned;

use crate::api::AppState;
use crate::model::{ApplicationResource, ApplicationState, ApplicationTask, Label, Node, Role};
use crate::store::{Collection, RecvOutcome, Subscription as StoreSubscription};

use super::types::{
    ApplicationResourceGql, ApplicationStateGql, ApplicationTaskGql, ChangeEventGql, LabelGql,
    NodeGql, RoleGql,
};

fn stream_changes<T, G>(sub: StoreSubscription<T>) -> impl Stream<Item = Result<ChangeEventGql<G>>>
where
    T: DeserializeOwned + Send + 'static,
    G: From<T> + async_graphql::OutputType,
{
    stream::unfold(sub, |mut sub| async move {
        loop {
            match sub.recv().await {
                RecvOutcome::Event(change, value) => {
                    let event = ChangeEventGql {
                        change: change.into(),
                        object: G::from(value),
                    };
                    return Some((Ok(event), sub));
                }
                RecvOutcome::Lagged => continue,
                RecvOutcome::Closed => return None,
            }
        }
    })
}

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    async fn node_changes(
        &self,
        ctx: &Context<'_>,
    ) -> Result<impl Stream<Item = Result<ChangeEventGql<NodeGql>>>> {
        let state = ctx.data::<AppState>()?;
        let sub: StoreSubscription<Node> =
            Collection::new(&state.store, crate::model::ObjectKind::Node).subscribe();
        Ok(stream_changes(sub))
    }

    async fn label_changes(
        &self,
        ctx: &Context<'_>,
    ) -> Result<impl Stream<Item = Result<ChangeEventGql<LabelGql>>>> {
        let state = ctx.data::<AppState>()?;
        let sub: StoreSubscription<Label> =
            Collection::new(&state.store, crate::model::ObjectKind::Label).subscribe();
        Ok(stream_changes(sub))
    }

    async fn role_changes(
        &self,
        ctx: &Context<'_>,
    ) -> Result<impl Stream<Item = Result<ChangeEventGql<RoleGql>>>> {
        let state = ctx.data::<AppState>()?;
        let sub: StoreSubscription<Role> =
            Collection::new(&state.store, crate::model::ObjectKind::Role).subscribe();
        Ok(stream_changes(sub))
    }

    async fn application_state_changes(
        &self,
        ctx: &Context<'_>,
    ) -> Result<impl Stream<Item = Result<ChangeEventGql<ApplicationStateGql>>>> {
        let state = ctx.data::<AppState>()?;
        let sub: StoreSubscription<ApplicationState> =
            Collection::new(&state.store, crate::model::ObjectKind::ApplicationState).subscribe();
        Ok(stream_changes(sub))
    }

    async fn application_task_changes(
        &self,
        ctx: &Context<'_>,
    ) -> Result<impl Stream<Item = Result<ChangeEventGql<ApplicationTaskGql>>>> {
        let state = ctx.data::<AppState>()?;
        let sub: StoreSubscription<ApplicationTask> =
            Collection::new(&state.store, crate::model::ObjectKind::ApplicationTask).subscribe();
        Ok(stream_changes(sub))
    }

    async fn application_resource_changes(
        &self,
        ctx: &Context<'_>,
    ) -> Result<impl Stream<Item = Result<ChangeEventGql<ApplicationResourceGql>>>> {
        let state = ctx.data::<AppState>()?;
        let sub: StoreSubscription<ApplicationResource> =
            Collection::new(&state.store, crate::model::ObjectKind::ApplicationResource).subscribe();
        Ok(stream_changes(sub))
    }
}
