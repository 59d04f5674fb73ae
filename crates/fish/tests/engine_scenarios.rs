//! End-to-end allocation-engine scenarios (§8 S1-S4, S6) driven against a
//! real `Engine` + `Store` + `TestDriver`, not mocks of the engine itself.

mod common;

use std::time::Duration;

use common::{wait_for_any_status, wait_for_status, Harness};
use fish::model::{ObjectKind, Status};
use fish::store::Collection;

/// S1 — happy path: one node, one label, one application reaches
/// `ALLOCATED` and gets exactly one `ApplicationResource`.
#[tokio::test]
async fn s1_happy_path_allocation() {
    let harness = Harness::single_node(None);
    let label = harness.create_label("l1", 1, 1).await;

    let app = harness
        .engine
        .create(label.uid, "alice", serde_json::Value::Null)
        .unwrap();

    wait_for_status(&harness.engine, app.uid, Status::New, Duration::from_millis(200)).await;
    wait_for_status(&harness.engine, app.uid, Status::Elected, Duration::from_secs(2)).await;
    wait_for_status(&harness.engine, app.uid, Status::Allocated, Duration::from_secs(2)).await;

    let resource = harness
        .engine
        .resource_for(app.uid)
        .unwrap()
        .expect("resource should exist once allocated");
    assert_eq!(resource.node_uid, harness.identity.uid());
    assert!(resource.identifier.starts_with("test-"));
}

/// S2 — capacity denial: with room for exactly one tenant, one of two
/// applications against the same label allocates and the other is
/// eventually abandoned with `ERROR` after the retry cap. Which of the
/// two wins the election is not pinned down by the spec (it depends on
/// random UID tie-break order), so this only asserts the outcome shape:
/// exactly one `ALLOCATED`, exactly one `ERROR`.
#[tokio::test]
async fn s2_capacity_denial_cycles_to_error() {
    let harness = Harness::single_node(Some(common::resources(1, 1)));
    let label = harness.create_label("l1", 1, 1).await;

    let a1 = harness
        .engine
        .create(label.uid, "alice", serde_json::Value::Null)
        .unwrap();
    let a2 = harness
        .engine
        .create(label.uid, "bob", serde_json::Value::Null)
        .unwrap();

    let terminal = [Status::Allocated, Status::Error];
    let a1_done = wait_for_any_status(&harness.engine, a1.uid, &terminal, Duration::from_secs(5));
    let a2_done = wait_for_any_status(&harness.engine, a2.uid, &terminal, Duration::from_secs(5));

    let (a1_state, a2_state) = tokio::join!(a1_done, a2_done);
    let statuses = [a1_state.status, a2_state.status];
    assert_eq!(statuses.iter().filter(|s| **s == Status::Allocated).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == Status::Error).count(), 1);

    // Only the winner should hold a resource.
    let winner = if a1_state.status == Status::Allocated { a1.uid } else { a2.uid };
    let loser = if a1_state.status == Status::Allocated { a2.uid } else { a1.uid };
    assert!(harness.engine.resource_for(winner).unwrap().is_some());
    assert!(harness.engine.resource_for(loser).unwrap().is_none());
}

/// S3 — deallocating an `ALLOCATED` application goes through a
/// `DEALLOCATE` record, calls the driver exactly once, lands on
/// `DEALLOCATED`, and cascades resource + ticket cleanup.
#[tokio::test]
async fn s3_deallocate_while_allocated() {
    let harness = Harness::single_node(None);
    let label = harness.create_label("l1", 1, 1).await;

    let app = harness
        .engine
        .create(label.uid, "alice", serde_json::Value::Null)
        .unwrap();
    wait_for_status(&harness.engine, app.uid, Status::Allocated, Duration::from_secs(2)).await;

    let resource = harness.engine.resource_for(app.uid).unwrap().unwrap();
    harness
        .tickets
        .create(resource.uid, "root", "some-hash")
        .expect("ticket create");

    let state = harness.engine.deallocate(app.uid, "user").unwrap();
    assert_eq!(state.status, Status::Deallocate);

    wait_for_status(&harness.engine, app.uid, Status::Deallocated, Duration::from_secs(5)).await;

    assert!(harness.engine.resource_for(app.uid).unwrap().is_none());
    assert!(matches!(
        harness.tickets.consume("root", "some-hash").await,
        Err(e) if e.is_not_found()
    ));

    let states: Vec<_> = Collection::<fish::model::ApplicationState>::new(&harness.store, ObjectKind::ApplicationState)
        .list()
        .unwrap()
        .into_iter()
        .filter(|s| s.application_uid == app.uid)
        .collect();
    assert_eq!(states.iter().filter(|s| s.status == Status::Deallocate).count(), 1);
    assert_eq!(states.iter().filter(|s| s.status == Status::Deallocated).count(), 1);
}

/// S4 — deallocating an application that never left `NEW` writes
/// `DEALLOCATED` directly, with no intermediate `DEALLOCATE` record and
/// no driver ever invoked.
#[tokio::test]
async fn s4_deallocate_while_new() {
    let harness = Harness::single_node_no_capacity();
    let label = harness.create_label("l1", 4, 4).await;

    let app = harness
        .engine
        .create(label.uid, "alice", serde_json::Value::Null)
        .unwrap();

    let state = harness.engine.deallocate(app.uid, "user").unwrap();
    assert_eq!(state.status, Status::Deallocated);

    let states: Vec<_> = Collection::<fish::model::ApplicationState>::new(&harness.store, ObjectKind::ApplicationState)
        .list()
        .unwrap()
        .into_iter()
        .filter(|s| s.application_uid == app.uid)
        .collect();
    assert!(states.iter().all(|s| s.status != Status::Deallocate));
    assert_eq!(states.iter().filter(|s| s.status == Status::Deallocated).count(), 1);
    assert!(harness.engine.resource_for(app.uid).unwrap().is_none());
}

/// S6 — an application stuck in `ELECTED` pointing at a node that has
/// gone stale is recovered by the sweeper, re-enters election, and
/// eventually allocates on the (only) active node.
#[tokio::test]
async fn s6_stale_election_recovers() {
    let harness = Harness::single_node(None);
    let label = harness.create_label("l1", 1, 1).await;

    let app = harness
        .engine
        .create(label.uid, "alice", serde_json::Value::Null)
        .unwrap();

    // Simulate a peer node ("node-b") that bid, won, and then vanished
    // before allocating. Its Node record predates the active window.
    let stale_node = fish::model::Node {
        uid: fish::uid::Uid::new(&[0xbb; 6]),
        name: "node-b".to_string(),
        address: "127.0.0.1:0".to_string(),
        pubkey: "deadbeef".to_string(),
        location: String::new(),
        definition: fish::model::NodeDefinition {
            host: "node-b".into(),
            cpu: Vec::new(),
            memory: 0,
            disks: Vec::new(),
            nets: Vec::new(),
        },
        created_at: chrono::Utc::now() - chrono::Duration::hours(1),
        updated_at: chrono::Utc::now() - chrono::Duration::hours(1),
        metadata: Default::default(),
    };
    let nodes: Collection<fish::model::Node> = Collection::new(&harness.store, ObjectKind::Node);
    nodes.add("node-b", &stale_node).unwrap();

    let states: Collection<fish::model::ApplicationState> =
        Collection::new(&harness.store, ObjectKind::ApplicationState);
    let elected = fish::model::ApplicationState {
        uid: fish::uid::Uid::new(&[0xbb; 6]),
        application_uid: app.uid,
        status: Status::Elected,
        description: stale_node.uid.to_string(),
        created_at: chrono::Utc::now(),
    };
    states.add(&elected.uid.to_string(), &elected).unwrap();

    // Sweeper should rewrite this to NEW, then the elector should pick up
    // this node (the only active one) and allocate.
    wait_for_status(&harness.engine, app.uid, Status::Allocated, Duration::from_secs(5)).await;

    let resource = harness.engine.resource_for(app.uid).unwrap().unwrap();
    assert_eq!(resource.node_uid, harness.identity.uid());
}
