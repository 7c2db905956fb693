//! Testing utilities for the divergence workspace
//!
//! Shared fixtures and a scripted remote collaborator whose replies, failures
//! and timing are controlled by the test.

#![allow(missing_docs)]

use async_trait::async_trait;
use divergence_core::{
    ChildCreated, DivergenceBatch, Edge, GraphStore, MapId, MapSnapshot, Node, NodeId, NodePatch,
    Position, RemoteCollaborator, RemoteError, RemoteOp,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const SAMPLE_MAP: &str = "map-1";

pub fn id(raw: &str) -> NodeId {
    NodeId::new(raw)
}

/// A root, B under A, C and D under B, E under D
pub fn sample_nodes() -> Vec<Node> {
    vec![
        Node::root("A", "Chairs", Position::ORIGIN),
        Node::new("B", "Rocking", Position::new(100.0, 0.0)).with_level(1),
        Node::new("C", "Curved runners", Position::new(200.0, -50.0)).with_level(2),
        Node::new("D", "Spring base", Position::new(200.0, 50.0)).with_level(2),
        Node::new("E", "Coil spring", Position::new(300.0, 50.0)).with_level(3),
    ]
}

pub fn sample_edges() -> Vec<Edge> {
    vec![
        Edge::new("A", "B"),
        Edge::new("B", "C"),
        Edge::new("B", "D"),
        Edge::new("D", "E"),
    ]
}

pub fn sample_store() -> GraphStore {
    GraphStore::from_parts(sample_nodes(), sample_edges()).unwrap()
}

pub fn sample_snapshot() -> MapSnapshot {
    MapSnapshot {
        map_id: MapId::new(SAMPLE_MAP),
        nodes: sample_nodes(),
        edges: sample_edges(),
    }
}

/// Batch of AI ideas under `parent`
pub fn idea_batch(parent: &str, ids: &[&str]) -> DivergenceBatch {
    let nodes: Vec<Node> = ids
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            #[allow(clippy::cast_precision_loss)]
            let y = i as f64 * 40.0;
            Node::new(*raw, format!("idea {raw}"), Position::new(400.0, y)).ai_generated()
        })
        .collect();
    let edges = ids.iter().map(|raw| Edge::new(parent, *raw)).collect();
    DivergenceBatch { nodes, edges }
}

/// Call received by [`ScriptedCollaborator`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load { topic_id: String },
    Expand { map_id: MapId, node: NodeId, position: Position },
    Update { map_id: MapId, node: NodeId, patch: NodePatch },
    Delete { map_id: MapId, node: NodeId },
    AddChild { map_id: MapId, parent: NodeId, content: String },
}

#[derive(Debug, Default)]
struct Script {
    snapshots: HashMap<String, MapSnapshot>,
    calls: Vec<Call>,
    failures: HashMap<RemoteOp, usize>,
    gates: HashMap<RemoteOp, Arc<Semaphore>>,
    expansions: VecDeque<DivergenceBatch>,
    deletions: VecDeque<Vec<NodeId>>,
    children: VecDeque<ChildCreated>,
    next_child: usize,
}

/// Remote collaborator driven entirely by the test
///
/// - `get_or_create_map` serves the snapshot registered for the topic (the
///   sample map by default)
/// - `expand_node`, `delete_node` and `add_child` pop queued replies, falling
///   back to an empty batch, the subtree of the sample map, or a generated child
/// - `hold(op)` parks every call of `op` until `release(op, n)`
/// - `fail_next(op, n)` fails the next `n` calls of `op` after any hold
#[derive(Debug, Default)]
pub struct ScriptedCollaborator {
    script: Mutex<Script>,
}

impl ScriptedCollaborator {
    pub fn new() -> Self {
        Self::with_snapshot("topic", sample_snapshot())
    }

    pub fn with_snapshot(topic_id: &str, snapshot: MapSnapshot) -> Self {
        let collaborator = Self::default();
        collaborator.serve(topic_id, snapshot);
        collaborator
    }

    pub fn serve(&self, topic_id: &str, snapshot: MapSnapshot) {
        self.script
            .lock()
            .snapshots
            .insert(topic_id.to_string(), snapshot);
    }

    pub fn fail_next(&self, op: RemoteOp, count: usize) {
        *self.script.lock().failures.entry(op).or_default() += count;
    }

    pub fn hold(&self, op: RemoteOp) {
        self.script
            .lock()
            .gates
            .insert(op, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, op: RemoteOp, count: usize) {
        if let Some(gate) = self.script.lock().gates.get(&op) {
            gate.add_permits(count);
        }
    }

    pub fn queue_expansion(&self, batch: DivergenceBatch) {
        self.script.lock().expansions.push_back(batch);
    }

    pub fn queue_deletion(&self, ids: Vec<NodeId>) {
        self.script.lock().deletions.push_back(ids);
    }

    pub fn queue_child(&self, created: ChildCreated) {
        self.script.lock().children.push_back(created);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.clone()
    }

    pub fn update_calls(&self) -> Vec<(MapId, NodeId, NodePatch)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update { map_id, node, patch } => Some((map_id, node, patch)),
                _ => None,
            })
            .collect()
    }

    /// Record the call, wait on any hold, then decide failure
    async fn enter(&self, op: RemoteOp, call: Call) -> Result<(), RemoteError> {
        let gate = {
            let mut script = self.script.lock();
            script.calls.push(call);
            script.gates.get(&op).cloned()
        };
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| RemoteError::Transport(e.to_string()))?
                .forget();
        }

        let mut script = self.script.lock();
        if let Some(remaining) = script.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Transport(format!("scripted {op:?} failure")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCollaborator for ScriptedCollaborator {
    async fn get_or_create_map(
        &self,
        topic_id: &str,
        _topic_title: &str,
    ) -> Result<MapSnapshot, RemoteError> {
        self.enter(
            RemoteOp::Load,
            Call::Load {
                topic_id: topic_id.to_string(),
            },
        )
        .await?;
        self.script
            .lock()
            .snapshots
            .get(topic_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("topic {topic_id}")))
    }

    async fn expand_node(
        &self,
        map_id: &MapId,
        node_id: &NodeId,
        position: Position,
    ) -> Result<DivergenceBatch, RemoteError> {
        self.enter(
            RemoteOp::Expand,
            Call::Expand {
                map_id: map_id.clone(),
                node: node_id.clone(),
                position,
            },
        )
        .await?;
        Ok(self.script.lock().expansions.pop_front().unwrap_or_default())
    }

    async fn update_node(
        &self,
        map_id: &MapId,
        node_id: &NodeId,
        patch: NodePatch,
    ) -> Result<Option<Node>, RemoteError> {
        self.enter(
            RemoteOp::Update,
            Call::Update {
                map_id: map_id.clone(),
                node: node_id.clone(),
                patch,
            },
        )
        .await?;
        Ok(None)
    }

    async fn delete_node(
        &self,
        map_id: &MapId,
        node_id: &NodeId,
    ) -> Result<Vec<NodeId>, RemoteError> {
        self.enter(
            RemoteOp::Delete,
            Call::Delete {
                map_id: map_id.clone(),
                node: node_id.clone(),
            },
        )
        .await?;
        if let Some(ids) = self.script.lock().deletions.pop_front() {
            return Ok(ids);
        }
        let mut ids = vec![node_id.clone()];
        ids.extend(divergence_core::descendants(&sample_edges(), node_id));
        Ok(ids)
    }

    async fn add_child(
        &self,
        map_id: &MapId,
        parent_id: &NodeId,
        content: &str,
        parent_position: Position,
    ) -> Result<ChildCreated, RemoteError> {
        self.enter(
            RemoteOp::AddChild,
            Call::AddChild {
                map_id: map_id.clone(),
                parent: parent_id.clone(),
                content: content.to_string(),
            },
        )
        .await?;
        let mut script = self.script.lock();
        if let Some(created) = script.children.pop_front() {
            return Ok(created);
        }
        script.next_child += 1;
        let child = NodeId::new(format!("{parent_id}-child-{}", script.next_child));
        Ok(ChildCreated {
            node: Node::new(child.clone(), content, parent_position + Position::new(0.0, 160.0)),
            edge: Edge::new(parent_id.clone(), child),
        })
    }
}
