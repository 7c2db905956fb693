//! Divergence merge
//!
//! Appends a server-generated batch of child ideas under one parent. A batch
//! is checked as a whole before anything touches the store; existing nodes
//! are never replaced or repositioned. At most one divergence request may be
//! in flight per map, enforced by [`DivergenceGate`].

use crate::error::EngineError;
use crate::store::GraphStore;
use crate::types::{DivergenceBatch, DivergenceType, NodeId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Map-wide mutual exclusion for divergence requests
#[derive(Debug, Clone, Default)]
pub struct DivergenceGate {
    busy: Arc<AtomicBool>,
}

impl DivergenceGate {
    /// Create an idle gate
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate without waiting
    ///
    /// # Errors
    /// - `EngineError::DivergenceBusy` if a permit is outstanding
    pub fn try_acquire(&self) -> Result<DivergencePermit, EngineError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::DivergenceBusy)?;
        Ok(DivergencePermit {
            busy: Arc::clone(&self.busy),
        })
    }

    /// A request is in flight
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the gate on drop
#[derive(Debug)]
pub struct DivergencePermit {
    busy: Arc<AtomicBool>,
}

impl Drop for DivergencePermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// What a merge appended
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Expanded parent
    pub parent: NodeId,
    /// New node ids in batch order
    pub added: Vec<NodeId>,
}

/// Check `batch` against the store and append it under `parent`
///
/// Every new node gets `is_ai_generated = true` and `level = parent.level + 1`;
/// a server value that disagrees is overwritten with a warning.
///
/// # Errors
/// - `EngineError::NodeNotFound` if `parent` is gone (e.g. deleted mid-request)
/// - `EngineError::MalformedBatch` if an edge does not come from `parent`,
///   a node lacks exactly one edge, an edge points outside the batch, an id
///   collides, or a node claims to be a root
pub fn merge(
    store: &mut GraphStore,
    parent: &NodeId,
    mut batch: DivergenceBatch,
) -> Result<MergeOutcome, EngineError> {
    let parent_level = store
        .node(parent)
        .map(|n| n.level)
        .ok_or_else(|| EngineError::NodeNotFound(parent.clone()))?;

    check_batch(store, parent, &batch)?;

    let level = parent_level + 1;
    for node in &mut batch.nodes {
        if node.level != level || !node.is_ai_generated {
            tracing::warn!(
                node = %node.id,
                server_level = node.level,
                level,
                is_ai_generated = node.is_ai_generated,
                "normalising divergence node"
            );
            node.level = level;
            node.is_ai_generated = true;
        }
    }

    let added: Vec<NodeId> = batch.nodes.iter().map(|n| n.id.clone()).collect();
    store.add_nodes(batch.nodes, batch.edges)?;
    tracing::info!(parent = %parent, count = added.len(), "merged divergence batch");

    Ok(MergeOutcome {
        parent: parent.clone(),
        added,
    })
}

fn check_batch(
    store: &GraphStore,
    parent: &NodeId,
    batch: &DivergenceBatch,
) -> Result<(), EngineError> {
    let mut ids = HashSet::with_capacity(batch.nodes.len());
    for node in &batch.nodes {
        if node.divergence_type == DivergenceType::Root {
            return Err(EngineError::MalformedBatch(format!("{} claims to be a root", node.id)));
        }
        if store.contains(&node.id) || !ids.insert(&node.id) {
            return Err(EngineError::MalformedBatch(format!("duplicate node id {}", node.id)));
        }
    }

    let mut targets = HashSet::with_capacity(batch.edges.len());
    for edge in &batch.edges {
        if &edge.source != parent {
            return Err(EngineError::MalformedBatch(format!(
                "edge {} -> {} does not start at {parent}",
                edge.source, edge.target
            )));
        }
        if !ids.contains(&edge.target) {
            return Err(EngineError::MalformedBatch(format!(
                "edge target {} is not in the batch",
                edge.target
            )));
        }
        if !targets.insert(&edge.target) {
            return Err(EngineError::MalformedBatch(format!(
                "{} has more than one parent edge",
                edge.target
            )));
        }
    }

    if targets.len() != ids.len() {
        return Err(EngineError::MalformedBatch(
            "every generated node needs exactly one parent edge".into(),
        ));
    }
    Ok(())
}
