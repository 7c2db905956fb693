//! Graph store
//!
//! Canonical in-memory nodes and edges for one mind map. Nodes keep insertion
//! order; appends never reorder or drop existing elements.

use crate::descendants;
use crate::error::StoreError;
use crate::types::{Edge, Node, NodeId, NodePatch, Position};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Store shared between the engine and its background write tasks.
pub type SharedStore = Arc<parking_lot::RwLock<GraphStore>>;

/// Nodes and edges of one mind map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStore {
    nodes: IndexMap<NodeId, Node>,
    edges: Vec<Edge>,
}

impl GraphStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a loaded snapshot
    ///
    /// # Errors
    /// - `StoreError::DuplicateNode` if two nodes share an id
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.add_nodes(nodes, edges)?;
        Ok(store)
    }

    /// Append nodes and edges
    ///
    /// The whole batch is checked before anything is appended, so a rejected
    /// batch leaves the store untouched.
    ///
    /// # Errors
    /// - `StoreError::DuplicateNode` if an id is already stored or repeats in the batch
    pub fn add_nodes(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) -> Result<(), StoreError> {
        let mut fresh = HashSet::with_capacity(nodes.len());
        for node in &nodes {
            if self.nodes.contains_key(&node.id) || !fresh.insert(&node.id) {
                return Err(StoreError::DuplicateNode(node.id.clone()));
            }
        }

        self.nodes.reserve(nodes.len());
        for node in nodes {
            self.nodes.insert(node.id.clone(), node);
        }
        self.edges.extend(edges);
        Ok(())
    }

    /// Append `node` together with the single edge from `parent`
    ///
    /// # Errors
    /// - `StoreError::MissingParent` if `parent` is not stored
    /// - `StoreError::DuplicateNode` if `node.id` is already stored
    pub fn add_child(&mut self, parent: &NodeId, node: Node) -> Result<&Node, StoreError> {
        if !self.nodes.contains_key(parent) {
            return Err(StoreError::MissingParent(parent.clone()));
        }
        let id = node.id.clone();
        let edge = Edge::new(parent.clone(), id.clone());
        self.add_nodes(vec![node], vec![edge])?;
        self.nodes
            .get(&id)
            .ok_or(StoreError::NodeNotFound(id))
    }

    /// Replace only the fields supplied in `patch`
    ///
    /// Returns `false` (and does nothing) when `id` is absent.
    pub fn update_node(&mut self, id: &NodeId, patch: &NodePatch) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.apply(patch);
                true
            }
            None => false,
        }
    }

    /// Set one node's absolute position (the cascade's per-node write)
    ///
    /// # Errors
    /// - `StoreError::NodeNotFound` if `id` is absent
    pub fn set_position(&mut self, id: &NodeId, position: Position) -> Result<(), StoreError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        node.position = position;
        Ok(())
    }

    /// Shift every listed node by `delta` through [`Self::set_position`];
    /// ids no longer stored are skipped.
    pub(crate) fn translate<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a NodeId>,
        delta: Position,
    ) -> usize {
        let mut moved = 0;
        for id in ids {
            let Some(at) = self.nodes.get(id).map(|n| n.position) else {
                continue;
            };
            if self.set_position(id, at + delta).is_ok() {
                moved += 1;
            }
        }
        moved
    }

    /// Remove the listed nodes, returning how many were present
    pub fn remove_nodes(&mut self, ids: &HashSet<NodeId>) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|id, _| !ids.contains(id));
        before - self.nodes.len()
    }

    /// Remove every edge matching `predicate`, returning how many were removed
    pub fn remove_edges(&mut self, mut predicate: impl FnMut(&Edge) -> bool) -> usize {
        let before = self.edges.len();
        self.edges.retain(|edge| !predicate(edge));
        before - self.edges.len()
    }

    /// Remove the listed nodes and every edge touching them
    ///
    /// # Errors
    /// - `StoreError::RootProtected` if `ids` contains the root; nothing is removed
    pub fn purge(&mut self, ids: &HashSet<NodeId>) -> Result<(usize, usize), StoreError> {
        if let Some(root) = self.nodes.values().find(|n| n.is_root() && ids.contains(&n.id)) {
            return Err(StoreError::RootProtected(root.id.clone()));
        }
        let nodes = self.remove_nodes(ids);
        let edges = self.remove_edges(|e| ids.contains(&e.source) || ids.contains(&e.target));
        Ok((nodes, edges))
    }

    /// Look up a node
    #[inline]
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Whether `id` is stored
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Edges in insertion order
    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Node count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// No nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The root node, if present
    #[must_use]
    pub fn root(&self) -> Option<&Node> {
        self.nodes.values().find(|n| n.is_root())
    }

    /// Direct children of `id` in edge order
    pub fn children<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.edges
            .iter()
            .filter(move |e| &e.source == id)
            .map(|e| &e.target)
    }

    /// Direct parent of `id` (first incoming edge)
    #[must_use]
    pub fn parent(&self, id: &NodeId) -> Option<&NodeId> {
        self.edges.iter().find(|e| &e.target == id).map(|e| &e.source)
    }

    /// Downward closure of `id`, excluding `id`
    #[must_use]
    pub fn descendants(&self, id: &NodeId) -> Vec<NodeId> {
        descendants::descendants(&self.edges, id)
    }

    /// Clone out nodes and edges
    #[must_use]
    pub fn to_parts(&self) -> (Vec<Node>, Vec<Edge>) {
        (self.nodes.values().cloned().collect(), self.edges.clone())
    }
}
