//! Position cascade
//!
//! Keeps a dragged subtree rigid: the delta applied to a node is applied to
//! every descendant in the same store write. Persistence is the caller's job
//! and happens once per gesture, see [`crate::engine::MindMapEngine::end_drag`].

use crate::error::StoreError;
use crate::store::GraphStore;
use crate::types::{NodeId, Position};

/// Result of one cascaded move
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOutcome {
    /// Applied delta
    pub delta: Position,
    /// Moved node first, then its descendants; empty for a zero delta
    pub moved: Vec<NodeId>,
}

impl CascadeOutcome {
    fn noop() -> Self {
        Self {
            delta: Position::ORIGIN,
            moved: Vec::new(),
        }
    }

    /// Nothing moved
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.moved.is_empty()
    }
}

/// Move `id` from `prior` to `new`, shifting its descendants by the same delta
///
/// Descendants are resolved against the edge set as it stands before the move.
///
/// # Errors
/// - `StoreError::NodeNotFound` if `id` is absent
pub fn apply_move(
    store: &mut GraphStore,
    id: &NodeId,
    prior: Position,
    new: Position,
) -> Result<CascadeOutcome, StoreError> {
    if !store.contains(id) {
        return Err(StoreError::NodeNotFound(id.clone()));
    }

    let delta = new - prior;
    if delta.is_zero() {
        return Ok(CascadeOutcome::noop());
    }

    let mut moved = Vec::with_capacity(8);
    moved.push(id.clone());
    moved.extend(store.descendants(id));

    store.translate(&moved, delta);
    tracing::debug!(node = %id, ?delta, count = moved.len(), "cascaded move");

    Ok(CascadeOutcome { delta, moved })
}

/// One drag gesture: begin, any number of frames, finish
///
/// The subtree is captured at `begin`, so nodes attached mid-gesture do not
/// follow the drag.
#[derive(Debug, Clone)]
pub struct DragGesture {
    node: NodeId,
    origin: Position,
    last: Position,
    subtree: Vec<NodeId>,
}

impl DragGesture {
    /// Start dragging `id` from its current position
    ///
    /// # Errors
    /// - `StoreError::NodeNotFound` if `id` is absent
    pub fn begin(store: &GraphStore, id: &NodeId) -> Result<Self, StoreError> {
        let origin = store
            .node(id)
            .map(|n| n.position)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;

        let mut subtree = Vec::with_capacity(8);
        subtree.push(id.clone());
        subtree.extend(store.descendants(id));

        Ok(Self {
            node: id.clone(),
            origin,
            last: origin,
            subtree,
        })
    }

    /// Dragged node
    #[inline]
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Apply an intermediate frame
    pub fn update(&mut self, store: &mut GraphStore, to: Position) -> CascadeOutcome {
        let delta = to - self.last;
        if delta.is_zero() {
            return CascadeOutcome::noop();
        }
        store.translate(&self.subtree, delta);
        self.last = to;
        CascadeOutcome {
            delta,
            moved: self.subtree.clone(),
        }
    }

    /// End the gesture
    ///
    /// A gesture that returned to its origin reports nothing to persist.
    #[must_use]
    pub fn finish(self) -> DragSummary {
        let total = self.last - self.origin;
        let moved = if total.is_zero() {
            Vec::new()
        } else {
            self.subtree
        };
        DragSummary {
            node: self.node,
            total_delta: total,
            moved,
        }
    }
}

/// What a finished gesture changed
#[derive(Debug, Clone, PartialEq)]
pub struct DragSummary {
    /// Dragged node
    pub node: NodeId,
    /// Net displacement over the gesture
    pub total_delta: Position,
    /// Nodes whose positions need persisting
    pub moved: Vec<NodeId>,
}
