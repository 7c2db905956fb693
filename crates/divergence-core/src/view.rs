//! Derived display views
//!
//! A view is an edge-induced subgraph: an edge is shown exactly when both of
//! its endpoints pass the node predicate. Views are computed on a copy and
//! never write to the canonical store.

use crate::store::GraphStore;
use crate::types::{Edge, Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Built-in node predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    /// Every node
    #[default]
    All,
    /// Starred ideas only
    MarkedOnly,
    /// Divergence output only
    AiGenerated,
    /// Root and manual children only
    Manual,
}

impl ViewMode {
    /// Whether `node` is shown in this mode
    #[must_use]
    pub fn matches(self, node: &Node) -> bool {
        match self {
            ViewMode::All => true,
            ViewMode::MarkedOnly => node.is_marked,
            ViewMode::AiGenerated => node.is_ai_generated,
            ViewMode::Manual => !node.is_ai_generated,
        }
    }
}

/// Read-only subgraph handed to the UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    /// Visible nodes, store order
    pub nodes: Vec<Node>,
    /// Edges whose endpoints are both visible
    pub edges: Vec<Edge>,
}

impl GraphView {
    /// Ids of visible nodes
    #[must_use]
    pub fn node_ids(&self) -> HashSet<NodeId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// Whether `id` is visible
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }
}

/// Filter `store` with `predicate`
pub fn filter(store: &GraphStore, predicate: impl Fn(&Node) -> bool) -> GraphView {
    let hidden: HashSet<NodeId> = store
        .nodes()
        .filter(|n| !predicate(n))
        .map(|n| n.id.clone())
        .collect();

    let mut derived = store.clone();
    derived.remove_nodes(&hidden);
    let visible: HashSet<NodeId> = derived.nodes().map(|n| n.id.clone()).collect();
    derived.remove_edges(|e| !visible.contains(&e.source) || !visible.contains(&e.target));

    let (nodes, edges) = derived.to_parts();
    GraphView { nodes, edges }
}

/// Filter `store` with a built-in mode
#[must_use]
pub fn filter_mode(store: &GraphStore, mode: ViewMode) -> GraphView {
    filter(store, |n| mode.matches(n))
}
