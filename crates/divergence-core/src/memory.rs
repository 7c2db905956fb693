//! In-memory remote collaborator
//!
//! In-process implementation of every remote contract, used by the simulator,
//! the CLI demo and tests. It assigns ids, places generated ideas on an arc
//! around the requested position, and computes deletion closures server-side.
//! Failures can be injected per operation or at a seeded random rate; an
//! injected failure is decided before any server state changes.

use crate::error::RemoteError;
use crate::remote::RemoteCollaborator;
use crate::store::GraphStore;
use crate::types::{
    ChildCreated, DivergenceBatch, DivergenceType, Edge, MapId, MapSnapshot, Node, NodeId,
    NodePatch, Position,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use uuid::Uuid;

/// Distance between a parent and its generated ideas
pub const DIVERGENCE_RADIUS: f64 = 220.0;

/// Vertical offset of a manually added child
pub const CHILD_OFFSET: Position = Position::new(0.0, 160.0);

/// Remote operations, for failure injection and call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// `get_or_create_map`
    Load,
    /// `expand_node`
    Expand,
    /// `update_node`
    Update,
    /// `delete_node`
    Delete,
    /// `add_child`
    AddChild,
}

#[derive(Debug)]
struct ServerState {
    topics: HashMap<String, MapId>,
    maps: HashMap<MapId, GraphStore>,
    next_node: u64,
    ideas_per_expansion: usize,
    failure_rate: f64,
    forced_failures: HashMap<RemoteOp, usize>,
    calls: HashMap<RemoteOp, usize>,
    rng: StdRng,
}

impl ServerState {
    fn next_id(&mut self) -> NodeId {
        self.next_node += 1;
        NodeId::new(format!("n{}", self.next_node))
    }

    /// Count the call, then decide whether it fails.
    fn gate(&mut self, op: RemoteOp) -> Result<(), RemoteError> {
        *self.calls.entry(op).or_default() += 1;

        if let Some(remaining) = self.forced_failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Transport(format!("injected {op:?} failure")));
            }
        }
        if self.failure_rate > 0.0 && self.rng.random_bool(self.failure_rate) {
            return Err(RemoteError::Rejected {
                status: 503,
                message: format!("random {op:?} failure"),
            });
        }
        Ok(())
    }

    fn map_mut(&mut self, map_id: &MapId) -> Result<&mut GraphStore, RemoteError> {
        self.maps
            .get_mut(map_id)
            .ok_or_else(|| RemoteError::NotFound(format!("map {map_id}")))
    }
}

/// In-process remote collaborator
#[derive(Debug)]
pub struct InMemoryCollaborator {
    state: Mutex<ServerState>,
}

impl InMemoryCollaborator {
    /// Create an empty server with three ideas per expansion
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create an empty server whose random failures follow `seed`
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Mutex::new(ServerState {
                topics: HashMap::new(),
                maps: HashMap::new(),
                next_node: 0,
                ideas_per_expansion: 3,
                failure_rate: 0.0,
                forced_failures: HashMap::new(),
                calls: HashMap::new(),
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }

    /// With number of ideas generated per expansion
    #[must_use]
    pub fn with_ideas_per_expansion(self, count: usize) -> Self {
        self.state.lock().ideas_per_expansion = count.max(1);
        self
    }

    /// Fail each call with probability `rate` (clamped to `0.0..=1.0`)
    pub fn set_failure_rate(&self, rate: f64) {
        self.state.lock().failure_rate = rate.clamp(0.0, 1.0);
    }

    /// Fail the next `count` calls of `op`
    pub fn fail_next(&self, op: RemoteOp, count: usize) {
        *self.state.lock().forced_failures.entry(op).or_default() += count;
    }

    /// Calls received for `op`, failed ones included
    #[must_use]
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Server-side copy of a map
    #[must_use]
    pub fn snapshot(&self, map_id: &MapId) -> Option<GraphStore> {
        self.state.lock().maps.get(map_id).cloned()
    }
}

impl Default for InMemoryCollaborator {
    fn default() -> Self {
        Self::new()
    }
}

/// Positions on an arc facing away from the grandparent side, centred on `hint`
fn fan_out(hint: Position, count: usize) -> Vec<Position> {
    let spread = PI / 2.0;
    (0..count)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = if count == 1 {
                0.5
            } else {
                i as f64 / (count - 1) as f64
            };
            let angle = -spread / 2.0 + spread * t;
            Position::new(
                hint.x + DIVERGENCE_RADIUS * angle.cos(),
                hint.y + DIVERGENCE_RADIUS * angle.sin(),
            )
        })
        .collect()
}

#[async_trait]
impl RemoteCollaborator for InMemoryCollaborator {
    async fn get_or_create_map(
        &self,
        topic_id: &str,
        topic_title: &str,
    ) -> Result<MapSnapshot, RemoteError> {
        let mut state = self.state.lock();
        state.gate(RemoteOp::Load)?;

        let map_id = if let Some(existing) = state.topics.get(topic_id) {
            existing.clone()
        } else {
            let map_id = MapId::new(Uuid::new_v4().to_string());
            let root_id = state.next_id();
            let store = GraphStore::from_parts(
                vec![Node::root(root_id, topic_title, Position::ORIGIN)],
                Vec::new(),
            )
            .map_err(|e| RemoteError::Rejected {
                status: 500,
                message: e.to_string(),
            })?;
            state.maps.insert(map_id.clone(), store);
            state.topics.insert(topic_id.to_string(), map_id.clone());
            map_id
        };

        let (nodes, edges) = state.map_mut(&map_id)?.to_parts();
        Ok(MapSnapshot {
            map_id,
            nodes,
            edges,
        })
    }

    async fn expand_node(
        &self,
        map_id: &MapId,
        node_id: &NodeId,
        position: Position,
    ) -> Result<DivergenceBatch, RemoteError> {
        let mut state = self.state.lock();
        state.gate(RemoteOp::Expand)?;

        let count = state.ideas_per_expansion;
        let ids: Vec<NodeId> = (0..count).map(|_| state.next_id()).collect();

        let map = state.map_mut(map_id)?;
        let parent = map
            .node(node_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("node {node_id}")))?;

        let nodes: Vec<Node> = ids
            .into_iter()
            .zip(fan_out(position, count))
            .enumerate()
            .map(|(i, (id, at))| {
                Node::new(id, format!("{} / idea {}", parent.content, i + 1), at)
                    .ai_generated()
                    .with_level(parent.level + 1)
                    .with_divergence_type(DivergenceType::Horizontal)
            })
            .collect();
        let edges: Vec<Edge> = nodes
            .iter()
            .map(|n| Edge::new(node_id.clone(), n.id.clone()))
            .collect();

        map.add_nodes(nodes.clone(), edges.clone())
            .map_err(|e| RemoteError::Rejected {
                status: 409,
                message: e.to_string(),
            })?;
        Ok(DivergenceBatch { nodes, edges })
    }

    async fn update_node(
        &self,
        map_id: &MapId,
        node_id: &NodeId,
        patch: NodePatch,
    ) -> Result<Option<Node>, RemoteError> {
        let mut state = self.state.lock();
        state.gate(RemoteOp::Update)?;

        let map = state.map_mut(map_id)?;
        if !map.update_node(node_id, &patch) {
            return Err(RemoteError::NotFound(format!("node {node_id}")));
        }
        Ok(map.node(node_id).cloned())
    }

    async fn delete_node(
        &self,
        map_id: &MapId,
        node_id: &NodeId,
    ) -> Result<Vec<NodeId>, RemoteError> {
        let mut state = self.state.lock();
        state.gate(RemoteOp::Delete)?;

        let map = state.map_mut(map_id)?;
        let target = map
            .node(node_id)
            .ok_or_else(|| RemoteError::NotFound(format!("node {node_id}")))?;
        if target.is_root() {
            return Err(RemoteError::Rejected {
                status: 400,
                message: "cannot delete the root node".into(),
            });
        }

        let mut deleted = vec![node_id.clone()];
        deleted.extend(map.descendants(node_id));
        let ids: HashSet<NodeId> = deleted.iter().cloned().collect();
        map.purge(&ids).map_err(|e| RemoteError::Rejected {
            status: 400,
            message: e.to_string(),
        })?;
        Ok(deleted)
    }

    async fn add_child(
        &self,
        map_id: &MapId,
        parent_id: &NodeId,
        content: &str,
        parent_position: Position,
    ) -> Result<ChildCreated, RemoteError> {
        let mut state = self.state.lock();
        state.gate(RemoteOp::AddChild)?;

        let id = state.next_id();
        let map = state.map_mut(map_id)?;
        let level = map
            .node(parent_id)
            .map(|p| p.level + 1)
            .ok_or_else(|| RemoteError::NotFound(format!("node {parent_id}")))?;

        let node = Node::new(id, content, parent_position + CHILD_OFFSET)
            .with_level(level)
            .with_divergence_type(DivergenceType::Vertical);
        let created = map
            .add_child(parent_id, node)
            .map_err(|e| RemoteError::Rejected {
                status: 409,
                message: e.to_string(),
            })?
            .clone();

        Ok(ChildCreated {
            edge: Edge::new(parent_id.clone(), created.id.clone()),
            node: created,
        })
    }
}
