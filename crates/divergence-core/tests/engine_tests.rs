//! Engine behaviour against a scripted remote

use divergence_core::prelude::*;
use divergence_core::{Edge, MapId, MapSnapshot, NodeField, NodePatch, RemoteOp, TreeValidator};
use divergence_core::ChildCreated;
use divergence_test_utils::{
    id, idea_batch, sample_nodes, sample_snapshot, sample_store, Call, ScriptedCollaborator,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

async fn opened() -> (Arc<MindMapEngine<ScriptedCollaborator>>, Arc<ScriptedCollaborator>) {
    let server = Arc::new(ScriptedCollaborator::new());
    let engine = Arc::new(MindMapEngine::new(Arc::clone(&server), EngineConfig::default()));
    engine.open("topic", "Chairs").await.unwrap();
    (engine, server)
}

async fn wait_for_call(server: &ScriptedCollaborator, matches: impl Fn(&Call) -> bool) {
    while !server.calls().iter().any(&matches) {
        tokio::task::yield_now().await;
    }
}

fn ids(raw: &[&str]) -> HashSet<NodeId> {
    raw.iter().map(|r| id(r)).collect()
}

#[tokio::test]
async fn descendants_of_b_are_c_d_e() {
    let (engine, _) = opened().await;
    let store = engine.snapshot();
    assert_eq!(store, sample_store());

    let found: HashSet<NodeId> = store.descendants(&id("B")).into_iter().collect();
    assert_eq!(found, ids(&["C", "D", "E"]));
    assert!(store.descendants(&id("E")).is_empty());
}

#[tokio::test]
async fn move_cascades_to_subtree_and_persists_each_node() {
    let (engine, server) = opened().await;

    let batch = engine
        .move_node(&id("B"), Position::new(100.0, 0.0), Position::new(110.0, -5.0))
        .unwrap();
    assert_eq!(batch.len(), 4);

    let store = engine.snapshot();
    assert_eq!(store.node(&id("A")).unwrap().position, Position::ORIGIN);
    assert_eq!(store.node(&id("B")).unwrap().position, Position::new(110.0, -5.0));
    assert_eq!(store.node(&id("C")).unwrap().position, Position::new(210.0, -55.0));
    assert_eq!(store.node(&id("D")).unwrap().position, Position::new(210.0, 45.0));
    assert_eq!(store.node(&id("E")).unwrap().position, Position::new(310.0, 45.0));

    let report = batch.settled().await;
    assert_eq!(report.persisted.len(), 4);
    assert!(report.failed.is_empty());

    let written: HashSet<NodeId> = server.update_calls().into_iter().map(|(_, node, _)| node).collect();
    assert_eq!(written, ids(&["B", "C", "D", "E"]));
}

#[tokio::test]
async fn drag_frames_accumulate_and_persist_once() {
    let (engine, server) = opened().await;

    engine.begin_drag(&id("D")).unwrap();
    engine.drag_to(Position::new(205.0, 50.0)).unwrap();
    engine.drag_to(Position::new(210.0, 60.0)).unwrap();
    assert!(server.update_calls().is_empty());

    let report = engine.end_drag().unwrap().settled().await;
    assert_eq!(report.persisted.len(), 2);
    assert_eq!(engine.node(&id("E")).unwrap().position, Position::new(310.0, 60.0));

    let patches = server.update_calls();
    assert_eq!(patches.len(), 2);
    assert!(patches.contains(&(
        MapId::new("map-1"),
        id("E"),
        NodePatch::position(Position::new(310.0, 60.0))
    )));
}

#[tokio::test]
async fn failed_mark_shows_value_then_reverts() {
    let (engine, server) = opened().await;
    let mut notices = engine.subscribe_notices().unwrap();
    server.hold(RemoteOp::Update);

    let pending = engine.toggle_mark(&id("C")).unwrap();
    assert!(engine.node(&id("C")).unwrap().is_marked);

    server.fail_next(RemoteOp::Update, 1);
    server.release(RemoteOp::Update, 1);
    assert!(pending.settled().await.is_err());

    assert!(!engine.node(&id("C")).unwrap().is_marked);
    match notices.recv().await {
        Some(Notice::Reverted { node, field, .. }) => {
            assert_eq!(node, id("C"));
            assert_eq!(field, NodeField::IsMarked);
        }
        other => panic!("unexpected notice {other:?}"),
    }

    // toggling again after the rollback lands
    server.release(RemoteOp::Update, 1);
    engine.toggle_mark(&id("C")).unwrap().settled().await.unwrap();
    assert!(engine.node(&id("C")).unwrap().is_marked);
}

#[tokio::test]
async fn stale_failure_does_not_clobber_newer_mark() {
    let (engine, server) = opened().await;
    server.hold(RemoteOp::Update);

    let first = engine.set_marked(&id("C"), true).unwrap();
    let second = engine.set_marked(&id("C"), false).unwrap();
    while server.update_calls().len() < 2 {
        tokio::task::yield_now().await;
    }

    // first write fails while the newer value is already in place
    server.fail_next(RemoteOp::Update, 1);
    server.release(RemoteOp::Update, 1);
    let _ = first.settled().await;
    server.release(RemoteOp::Update, 1);
    let _ = second.settled().await;

    assert!(!engine.node(&id("C")).unwrap().is_marked);
}

#[tokio::test]
async fn stale_failure_does_not_revert_after_value_repeats() {
    let (engine, server) = opened().await;
    server.hold(RemoteOp::Update);

    let first = engine.set_marked(&id("C"), true).unwrap();
    let second = engine.set_marked(&id("C"), false).unwrap();
    let third = engine.set_marked(&id("C"), true).unwrap();
    while server.update_calls().len() < 3 {
        tokio::task::yield_now().await;
    }

    // the field holds `true` again, but from a newer write
    server.fail_next(RemoteOp::Update, 1);
    server.release(RemoteOp::Update, 1);
    assert!(first.settled().await.is_err());
    assert!(engine.node(&id("C")).unwrap().is_marked);

    server.release(RemoteOp::Update, 2);
    second.settled().await.unwrap();
    third.settled().await.unwrap();
    assert!(engine.node(&id("C")).unwrap().is_marked);
}

#[tokio::test(start_paused = true)]
async fn mark_times_out_and_reverts() {
    let server = Arc::new(ScriptedCollaborator::new());
    let config = EngineConfig::default().with_remote_timeout(Duration::from_millis(50));
    let engine = MindMapEngine::new(Arc::clone(&server), config);
    engine.open("topic", "Chairs").await.unwrap();
    server.hold(RemoteOp::Update);

    let pending = engine.toggle_mark(&id("B")).unwrap();
    let outcome = pending.settled().await;

    assert!(matches!(outcome, Err(EngineError::Timeout { duration_ms: 50 })));
    assert!(!engine.node(&id("B")).unwrap().is_marked);
}

#[tokio::test]
async fn failed_content_edit_keeps_local_value() {
    let (engine, server) = opened().await;
    let mut notices = engine.subscribe_notices().unwrap();
    server.fail_next(RemoteOp::Update, 1);

    let outcome = engine.edit_content(&id("C"), "Bent plywood").unwrap().settled().await;

    assert!(outcome.is_err());
    assert_eq!(engine.node(&id("C")).unwrap().content, "Bent plywood");
    assert!(matches!(
        notices.recv().await,
        Some(Notice::WriteFailed { field: NodeField::Content, .. })
    ));
}

#[tokio::test]
async fn failed_position_write_is_reported_not_reverted() {
    let (engine, server) = opened().await;
    server.fail_next(RemoteOp::Update, 1);

    let report = engine
        .move_node(&id("E"), Position::new(300.0, 50.0), Position::new(320.0, 50.0))
        .unwrap()
        .settled()
        .await;

    assert_eq!(report.failed, vec![id("E")]);
    assert_eq!(engine.node(&id("E")).unwrap().position, Position::new(320.0, 50.0));
}

#[tokio::test]
async fn deleting_b_leaves_only_root() {
    let (engine, server) = opened().await;

    let plan = engine.plan_deletion(&id("B")).unwrap();
    assert_eq!(plan.affected(), &[id("B"), id("C"), id("D"), id("E")]);

    let removed = engine.delete(plan).await.unwrap();
    assert_eq!(removed.into_iter().collect::<HashSet<_>>(), ids(&["B", "C", "D", "E"]));

    let store = engine.snapshot();
    assert_eq!(store.nodes().map(|n| n.id.clone()).collect::<Vec<_>>(), vec![id("A")]);
    assert!(store.edges().is_empty());
    assert_eq!(
        server.calls().last(),
        Some(&Call::Delete {
            map_id: MapId::new("map-1"),
            node: id("B")
        })
    );
}

#[tokio::test]
async fn delete_removes_local_closure_even_if_remote_reports_less() {
    let (engine, server) = opened().await;
    server.queue_deletion(vec![id("D")]);

    let plan = engine.plan_deletion(&id("D")).unwrap();
    engine.delete(plan).await.unwrap();

    let store = engine.snapshot();
    assert!(!store.contains(&id("D")));
    assert!(!store.contains(&id("E")));
    assert!(store.edges().iter().all(|e| !e.touches(&id("D")) && !e.touches(&id("E"))));
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn failed_delete_changes_nothing() {
    let (engine, server) = opened().await;
    let mut notices = engine.subscribe_notices().unwrap();
    server.fail_next(RemoteOp::Delete, 1);
    let before = engine.snapshot();

    let plan = engine.plan_deletion(&id("B")).unwrap();
    assert!(engine.delete(plan).await.is_err());

    assert_eq!(engine.snapshot(), before);
    assert!(matches!(notices.recv().await, Some(Notice::DeleteFailed { .. })));
}

#[tokio::test]
async fn divergence_merge_keeps_concurrent_edits() {
    let (engine, server) = opened().await;
    server.hold(RemoteOp::Expand);
    server.queue_expansion(idea_batch("D", &["F", "G"]));

    let diverging = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.diverge(&id("D")).await })
    };
    wait_for_call(&server, |c| matches!(c, Call::Expand { .. })).await;
    assert!(engine.is_diverging());

    engine.edit_content(&id("C"), "Edited mid-flight").unwrap().settled().await.unwrap();
    engine.toggle_mark(&id("B")).unwrap().settled().await.unwrap();
    engine
        .move_node(&id("A"), Position::ORIGIN, Position::new(1.0, 1.0))
        .unwrap()
        .settled()
        .await;

    server.release(RemoteOp::Expand, 1);
    let merged = diverging.await.unwrap().unwrap();
    assert_eq!(merged.added, vec![id("F"), id("G")]);
    assert!(!engine.is_diverging());

    let store = engine.snapshot();
    assert_eq!(store.node(&id("C")).unwrap().content, "Edited mid-flight");
    assert!(store.node(&id("B")).unwrap().is_marked);
    assert_eq!(store.node(&id("E")).unwrap().position, Position::new(301.0, 51.0));
    for new in ["F", "G"] {
        let node = store.node(&id(new)).unwrap();
        assert_eq!(node.level, 3);
        assert!(node.is_ai_generated);
        assert_eq!(store.parent(&id(new)), Some(&id("D")));
    }
    assert_eq!(store.len(), 7);
    assert!(TreeValidator::new().check(&store).is_valid());
}

#[tokio::test]
async fn second_divergence_is_rejected_while_busy() {
    let (engine, server) = opened().await;
    server.hold(RemoteOp::Expand);
    server.queue_expansion(idea_batch("D", &["F"]));

    let d = id("D");
    let (first, second) = tokio::join!(engine.diverge(&d), async {
        let outcome = engine.diverge(&id("C")).await;
        server.release(RemoteOp::Expand, 1);
        outcome
    });

    assert_eq!(first.unwrap().added, vec![id("F")]);
    assert!(matches!(second, Err(EngineError::DivergenceBusy)));
    let expands = server.calls().into_iter().filter(|c| matches!(c, Call::Expand { .. })).count();
    assert_eq!(expands, 1);
}

#[tokio::test]
async fn divergence_into_deleted_parent_is_dropped() {
    let (engine, server) = opened().await;
    server.hold(RemoteOp::Expand);
    server.queue_expansion(idea_batch("E", &["F"]));

    let diverging = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.diverge(&id("E")).await })
    };
    wait_for_call(&server, |c| matches!(c, Call::Expand { .. })).await;

    let plan = engine.plan_deletion(&id("D")).unwrap();
    engine.delete(plan).await.unwrap();
    server.release(RemoteOp::Expand, 1);

    assert!(matches!(diverging.await.unwrap(), Err(EngineError::NodeNotFound(_))));
    assert!(!engine.snapshot().contains(&id("F")));
}

#[tokio::test]
async fn malformed_batch_is_rejected_whole() {
    let (engine, server) = opened().await;
    let mut batch = idea_batch("D", &["F", "G"]);
    batch.edges[1] = Edge::new("C", "G");
    server.queue_expansion(batch);
    let before = engine.snapshot();

    let outcome = engine.diverge(&id("D")).await;

    assert!(matches!(outcome, Err(EngineError::MalformedBatch(_))));
    assert_eq!(engine.snapshot(), before);
    assert!(!engine.is_diverging());
}

#[tokio::test]
async fn failed_divergence_emits_notice_and_releases_gate() {
    let (engine, server) = opened().await;
    let mut notices = engine.subscribe_notices().unwrap();
    server.fail_next(RemoteOp::Expand, 1);

    assert!(engine.diverge(&id("B")).await.is_err());
    assert!(!engine.is_diverging());
    assert!(matches!(notices.recv().await, Some(Notice::DivergenceFailed { .. })));

    server.queue_expansion(idea_batch("B", &["F"]));
    assert!(engine.diverge(&id("B")).await.is_ok());
}

#[tokio::test]
async fn manual_child_gets_parent_level_plus_one() {
    let (engine, server) = opened().await;

    let child = engine.add_child(&id("D"), "Leaf spring").await.unwrap();

    assert_eq!(child.level, 3);
    assert_eq!(child.content, "Leaf spring");
    assert_eq!(engine.snapshot().parent(&child.id), Some(&id("D")));
    assert!(matches!(
        server.calls().last(),
        Some(Call::AddChild { parent, .. }) if parent == &id("D")
    ));
}

#[tokio::test]
async fn manual_child_claiming_root_is_rejected() {
    let (engine, server) = opened().await;
    server.queue_child(ChildCreated {
        node: Node::root("X", "second root", Position::ORIGIN),
        edge: Edge::new("D", "X"),
    });
    let before = engine.snapshot();

    let outcome = engine.add_child(&id("D"), "Leaf spring").await;

    assert!(matches!(outcome, Err(EngineError::MalformedBatch(_))));
    assert_eq!(engine.snapshot(), before);
}

#[tokio::test]
async fn manual_child_with_foreign_edge_is_rejected() {
    let (engine, server) = opened().await;
    server.queue_child(ChildCreated {
        node: Node::new("X", "leaf", Position::ORIGIN),
        edge: Edge::new("C", "X"),
    });

    let outcome = engine.add_child(&id("D"), "Leaf spring").await;

    assert!(matches!(outcome, Err(EngineError::MalformedBatch(_))));
    assert!(!engine.snapshot().contains(&id("X")));
}

#[tokio::test]
async fn writes_use_map_id_current_at_send_time() {
    let server = Arc::new(ScriptedCollaborator::new());
    let engine = MindMapEngine::new(Arc::clone(&server), EngineConfig::default());
    let cell = engine.map_id_cell();
    assert_eq!(cell.current(), None);

    engine.open("topic", "Chairs").await.unwrap();
    assert_eq!(cell.current(), Some(MapId::new("map-1")));
    let plan = engine.plan_deletion(&id("B")).unwrap();

    server.serve(
        "other",
        MapSnapshot {
            map_id: MapId::new("map-2"),
            nodes: sample_nodes(),
            edges: sample_snapshot().edges,
        },
    );
    engine.open("other", "Lamps").await.unwrap();
    assert_eq!(cell.current(), Some(MapId::new("map-2")));

    engine.toggle_mark(&id("B")).unwrap().settled().await.unwrap();
    let (map_id, _, _) = server.update_calls().pop().unwrap();
    assert_eq!(map_id, MapId::new("map-2"));

    assert!(matches!(engine.delete(plan).await, Err(EngineError::StaleDeletionPlan)));
}

#[tokio::test]
async fn views_are_edge_induced() {
    let (engine, _) = opened().await;
    engine.set_marked(&id("B"), true).unwrap().settled().await.unwrap();
    engine.set_marked(&id("D"), true).unwrap().settled().await.unwrap();
    engine.set_marked(&id("E"), true).unwrap().settled().await.unwrap();

    let view = engine.view(ViewMode::MarkedOnly);
    assert_eq!(view.node_ids(), ids(&["B", "D", "E"]));
    assert_eq!(view.edges, vec![Edge::new("B", "D"), Edge::new("D", "E")]);

    let custom = engine.view_where(|n| n.level <= 1);
    assert_eq!(custom.edges, vec![Edge::new("A", "B")]);
    assert_eq!(engine.snapshot().len(), 5);
}
