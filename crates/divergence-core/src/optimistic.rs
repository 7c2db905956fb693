//! Optimistic mutation coordinator
//!
//! Guarded writes follow "apply, then reconcile-or-revert":
//! 1. Capture the field's current value
//! 2. Apply the new value to the store and return immediately
//! 3. Send the write to the remote collaborator in the background
//! 4. On failure, restore the captured value and emit a notice
//!
//! Unguarded writes (content edits, position persistence) skip step 4's revert
//! and only notify. The map id is read from a [`MapIdCell`] when each request
//! is issued, never captured when the task is built.

use crate::error::EngineError;
use crate::notice::{Notice, NoticeSender};
use crate::remote::{bounded, RemoteCollaborator};
use crate::store::SharedStore;
use crate::types::{MapId, Node, NodeField, NodeId, NodePatch};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shared, always-current map id
///
/// Clones observe the same cell, so a task spawned before `open` finishes
/// still sees the id once it is set.
#[derive(Debug, Clone, Default)]
pub struct MapIdCell(Arc<RwLock<Option<MapId>>>);

impl MapIdCell {
    /// Create an empty cell
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current id
    pub fn set(&self, map_id: MapId) {
        *self.0.write() = Some(map_id);
    }

    /// Forget the current id
    pub fn clear(&self) {
        *self.0.write() = None;
    }

    /// Current id, if a map is loaded
    #[must_use]
    pub fn current(&self) -> Option<MapId> {
        self.0.read().clone()
    }

    /// Current id or `MapNotLoaded`
    ///
    /// # Errors
    /// - `EngineError::MapNotLoaded` if no id is set
    pub fn require(&self) -> Result<MapId, EngineError> {
        self.current().ok_or(EngineError::MapNotLoaded)
    }
}

/// A node field the coordinator can capture, apply and restore
pub trait GuardedField: Send + Sync + 'static {
    /// Field value
    type Value: Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Label for logs and notices
    const FIELD: NodeField;

    /// Read the field
    fn read(node: &Node) -> Self::Value;

    /// Patch carrying `value`
    fn patch(value: Self::Value) -> NodePatch;
}

/// `isMarked`
#[derive(Debug, Clone, Copy)]
pub struct Marked;

impl GuardedField for Marked {
    type Value = bool;

    const FIELD: NodeField = NodeField::IsMarked;

    fn read(node: &Node) -> bool {
        node.is_marked
    }

    fn patch(value: bool) -> NodePatch {
        NodePatch::marked(value)
    }
}

/// Handle to a background remote write
///
/// Dropping it does not cancel the write.
#[derive(Debug)]
pub struct PendingWrite {
    node: NodeId,
    handle: JoinHandle<Result<(), EngineError>>,
}

impl PendingWrite {
    /// Node being written
    #[inline]
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Wait for the remote outcome (after any revert has been applied)
    ///
    /// # Errors
    /// The remote error, or `EngineError::TaskFailed` if the task panicked
    pub async fn settled(self) -> Result<(), EngineError> {
        self.handle
            .await
            .map_err(|e| EngineError::TaskFailed(e.to_string()))?
    }
}

/// Latest guarded-write generation per node field
type Generations = Arc<Mutex<HashMap<(NodeId, NodeField), u64>>>;

/// Applies guarded and unguarded node writes
#[derive(Debug)]
pub struct OptimisticCoordinator<R> {
    remote: Arc<R>,
    store: SharedStore,
    map_id: MapIdCell,
    notices: NoticeSender,
    timeout: Duration,
    generations: Generations,
}

impl<R: RemoteCollaborator> OptimisticCoordinator<R> {
    /// Create a coordinator over shared engine state
    #[must_use]
    pub fn new(
        remote: Arc<R>,
        store: SharedStore,
        map_id: MapIdCell,
        notices: NoticeSender,
        timeout: Duration,
    ) -> Self {
        Self {
            remote,
            store,
            map_id,
            notices,
            timeout,
            generations: Generations::default(),
        }
    }

    /// Guarded write of field `F`
    ///
    /// The store holds `value` when this returns. If the remote write fails,
    /// the captured prior value is restored, unless a newer guarded write to
    /// the same field was applied in the meantime. Each write takes a
    /// generation under the store lock and only the latest one may revert.
    ///
    /// # Errors
    /// - `EngineError::NodeNotFound` if `id` is absent (nothing is sent)
    pub fn apply<F: GuardedField>(
        &self,
        id: &NodeId,
        value: F::Value,
    ) -> Result<PendingWrite, EngineError> {
        let (prior, generation) = {
            let mut store = self.store.write();
            let prior = store
                .node(id)
                .map(F::read)
                .ok_or_else(|| EngineError::NodeNotFound(id.clone()))?;
            store.update_node(id, &F::patch(value.clone()));
            let mut generations = self.generations.lock();
            let generation = generations.entry((id.clone(), F::FIELD)).or_default();
            *generation += 1;
            (prior, *generation)
        };
        tracing::debug!(node = %id, field = %F::FIELD, ?prior, ?value, generation, "optimistic apply");

        let remote = Arc::clone(&self.remote);
        let store = Arc::clone(&self.store);
        let cell = self.map_id.clone();
        let notices = self.notices.clone();
        let generations = Arc::clone(&self.generations);
        let timeout = self.timeout;
        let node = id.clone();

        let handle = tokio::spawn(async move {
            let outcome = send_patch(&*remote, &cell, &node, F::patch(value), timeout).await;
            if let Err(err) = &outcome {
                let reverted = {
                    let mut store = store.write();
                    let latest = generations.lock().get(&(node.clone(), F::FIELD)).copied();
                    if latest == Some(generation) {
                        store.update_node(&node, &F::patch(prior.clone()))
                    } else {
                        false
                    }
                };
                if reverted {
                    tracing::warn!(node = %node, field = %F::FIELD, error = %err, "remote write failed, reverted");
                } else {
                    tracing::warn!(node = %node, field = %F::FIELD, error = %err, "remote write failed, value already superseded");
                }
                notices.emit(Notice::Reverted {
                    node: node.clone(),
                    field: F::FIELD,
                    error: err.to_string(),
                });
            }
            outcome
        });

        Ok(PendingWrite {
            node: id.clone(),
            handle,
        })
    }

    /// Unguarded write: apply locally, send, never revert
    ///
    /// # Errors
    /// - `EngineError::NodeNotFound` if `id` is absent (nothing is sent)
    pub fn write_through(&self, id: &NodeId, patch: NodePatch) -> Result<PendingWrite, EngineError> {
        if !self.store.write().update_node(id, &patch) {
            return Err(EngineError::NodeNotFound(id.clone()));
        }
        Ok(self.send_unguarded(id, patch))
    }

    /// Unguarded write of a value already in the store (drag persistence)
    pub(crate) fn send_unguarded(&self, id: &NodeId, patch: NodePatch) -> PendingWrite {
        let remote = Arc::clone(&self.remote);
        let cell = self.map_id.clone();
        let notices = self.notices.clone();
        let timeout = self.timeout;
        let node = id.clone();
        let field = patch.field().unwrap_or(NodeField::Content);

        let handle = tokio::spawn(async move {
            let outcome = send_patch(&*remote, &cell, &node, patch, timeout).await;
            if let Err(err) = &outcome {
                tracing::warn!(node = %node, %field, error = %err, "unguarded remote write failed, local value kept");
                notices.emit(Notice::WriteFailed {
                    node: node.clone(),
                    field,
                    error: err.to_string(),
                });
            }
            outcome
        });

        PendingWrite {
            node: id.clone(),
            handle,
        }
    }
}

async fn send_patch<R: RemoteCollaborator>(
    remote: &R,
    cell: &MapIdCell,
    node: &NodeId,
    patch: NodePatch,
    timeout: Duration,
) -> Result<(), EngineError> {
    let map_id = cell.require()?;
    bounded(timeout, remote.update_node(&map_id, node, patch))
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_id_cell_is_shared_between_clones() {
        let cell = MapIdCell::new();
        let observer = cell.clone();
        assert!(matches!(observer.require(), Err(EngineError::MapNotLoaded)));

        cell.set(MapId::new("m1"));
        assert_eq!(observer.current(), Some(MapId::new("m1")));

        cell.set(MapId::new("m2"));
        assert_eq!(observer.require().unwrap(), MapId::new("m2"));

        cell.clear();
        assert_eq!(observer.current(), None);
    }

    #[test]
    fn marked_field_round_trip() {
        let mut node = Node::new("n", "x", crate::types::Position::ORIGIN);
        node.apply(&Marked::patch(true));
        assert!(Marked::read(&node));
        assert_eq!(Marked::FIELD, NodeField::IsMarked);
    }
}
