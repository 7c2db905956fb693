//! Mind-map engine
//!
//! The only surface the canvas UI talks to:
//! - Opens (gets or creates) the map for a topic
//! - Routes mark toggles through the optimistic coordinator
//! - Cascades drags and persists them once per gesture
//! - Merges divergence batches and manual children
//! - Deletes confirmed subtrees
//! - Derives filtered views
//!
//! Guarded vs. unguarded writes: only the mark toggle reverts on remote
//! failure. Content edits and drag persistence keep the local value and emit
//! a notice; manual adds, divergence and deletion only change the store after
//! the remote confirms, so a failure leaves nothing to revert.

use crate::cascade::{self, CascadeOutcome, DragGesture};
use crate::config::EngineConfig;
use crate::divergence::{self, DivergenceGate, MergeOutcome};
use crate::error::EngineError;
use crate::notice::{self, Notice, NoticeSender};
use crate::optimistic::{Marked, MapIdCell, OptimisticCoordinator, PendingWrite};
use crate::remote::{bounded, RemoteCollaborator};
use crate::store::{GraphStore, SharedStore};
use crate::types::{MapId, Node, NodeId, NodePatch, Position};
use crate::validate::TreeValidator;
use crate::view::{self, GraphView, ViewMode};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Confirmed-to-be deletion of a node and its subtree
///
/// Built by [`MindMapEngine::plan_deletion`] so the UI can show what will go
/// before the user confirms.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionPlan {
    map_id: MapId,
    target: NodeId,
    affected: Vec<NodeId>,
}

impl DeletionPlan {
    /// Node the user asked to delete
    #[inline]
    #[must_use]
    pub fn target(&self) -> &NodeId {
        &self.target
    }

    /// Target followed by its current descendants
    #[inline]
    #[must_use]
    pub fn affected(&self) -> &[NodeId] {
        &self.affected
    }
}

/// Outcome of one persisted position write
#[derive(Debug, Clone, PartialEq)]
pub struct PersistReport {
    /// Nodes whose positions the remote accepted
    pub persisted: Vec<NodeId>,
    /// Nodes whose writes failed (local position kept)
    pub failed: Vec<NodeId>,
}

/// Independent position writes issued for one gesture
///
/// Writes are unordered and not atomic; dropping the batch does not cancel them.
#[derive(Debug, Default)]
pub struct PersistBatch {
    writes: Vec<PendingWrite>,
}

impl PersistBatch {
    /// Number of writes issued
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Nothing to persist
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Wait for every write
    pub async fn settled(self) -> PersistReport {
        let outcomes = join_all(self.writes.into_iter().map(|w| async move {
            let node = w.node().clone();
            (node, w.settled().await)
        }))
        .await;

        let mut report = PersistReport {
            persisted: Vec::new(),
            failed: Vec::new(),
        };
        for (node, outcome) in outcomes {
            match outcome {
                Ok(()) => report.persisted.push(node),
                Err(_) => report.failed.push(node),
            }
        }
        report
    }
}

/// Engine state for one canvas session
#[derive(Debug)]
pub struct MindMapEngine<R> {
    config: EngineConfig,
    remote: Arc<R>,
    store: SharedStore,
    map_id: MapIdCell,
    coordinator: OptimisticCoordinator<R>,
    gate: DivergenceGate,
    drag: Mutex<Option<DragGesture>>,
    notices: NoticeSender,
    notice_rx: Mutex<Option<mpsc::Receiver<Notice>>>,
}

impl<R: RemoteCollaborator> MindMapEngine<R> {
    /// Create an engine with no map loaded
    #[must_use]
    pub fn new(remote: Arc<R>, config: EngineConfig) -> Self {
        let store: SharedStore = Arc::new(RwLock::new(GraphStore::new()));
        let map_id = MapIdCell::new();
        let (notices, notice_rx) = notice::channel(config.notice_capacity);
        let coordinator = OptimisticCoordinator::new(
            Arc::clone(&remote),
            Arc::clone(&store),
            map_id.clone(),
            notices.clone(),
            config.remote_timeout(),
        );

        Self {
            config,
            remote,
            store,
            map_id,
            coordinator,
            gate: DivergenceGate::new(),
            drag: Mutex::new(None),
            notices,
            notice_rx: Mutex::new(Some(notice_rx)),
        }
    }

    /// Take the notice receiver (available once)
    pub fn subscribe_notices(&self) -> Option<mpsc::Receiver<Notice>> {
        self.notice_rx.lock().take()
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Currently loaded map
    #[must_use]
    pub fn map_id(&self) -> Option<MapId> {
        self.map_id.current()
    }

    /// Shared map-id cell, for callbacks created before the map loads
    #[must_use]
    pub fn map_id_cell(&self) -> MapIdCell {
        self.map_id.clone()
    }

    /// Copy of the canonical store
    #[must_use]
    pub fn snapshot(&self) -> GraphStore {
        self.store.read().clone()
    }

    /// Copy of one node
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.store.read().node(id).cloned()
    }

    /// Divergence request in flight
    #[must_use]
    pub fn is_diverging(&self) -> bool {
        self.gate.is_busy()
    }

    /// Load (creating on first access) the map for a topic
    ///
    /// Replaces the store wholesale and points the map-id cell at the new map.
    ///
    /// # Errors
    /// - `EngineError::Remote` / `EngineError::Timeout` if the load fails
    /// - `EngineError::Store` if the snapshot repeats a node id
    #[tracing::instrument(skip(self))]
    pub async fn open(&self, topic_id: &str, topic_title: &str) -> Result<MapId, EngineError> {
        let snapshot = bounded(
            self.config.remote_timeout(),
            self.remote.get_or_create_map(topic_id, topic_title),
        )
        .await?;

        let store = GraphStore::from_parts(snapshot.nodes, snapshot.edges)?;
        tracing::info!(map = %snapshot.map_id, nodes = store.len(), edges = store.edges().len(), "map loaded");
        if self.config.validate_after_merge {
            self.report_violations(&store);
        }

        *self.store.write() = store;
        *self.drag.lock() = None;
        self.map_id.set(snapshot.map_id.clone());
        Ok(snapshot.map_id)
    }

    /// Flip a node's marked flag optimistically
    ///
    /// # Errors
    /// - `EngineError::NodeNotFound` if `id` is absent
    pub fn toggle_mark(&self, id: &NodeId) -> Result<PendingWrite, EngineError> {
        let current = self
            .store
            .read()
            .node(id)
            .map(|n| n.is_marked)
            .ok_or_else(|| EngineError::NodeNotFound(id.clone()))?;
        self.set_marked(id, !current)
    }

    /// Set a node's marked flag optimistically
    ///
    /// # Errors
    /// - `EngineError::NodeNotFound` if `id` is absent
    pub fn set_marked(&self, id: &NodeId, value: bool) -> Result<PendingWrite, EngineError> {
        self.coordinator.apply::<Marked>(id, value)
    }

    /// Edit a node's label; not reverted if the remote write fails
    ///
    /// # Errors
    /// - `EngineError::NodeNotFound` if `id` is absent
    pub fn edit_content(
        &self,
        id: &NodeId,
        content: impl Into<String>,
    ) -> Result<PendingWrite, EngineError> {
        self.coordinator.write_through(id, NodePatch::content(content))
    }

    /// Start dragging `id`
    ///
    /// # Errors
    /// - `EngineError::DragInProgress` if another gesture is active
    /// - `EngineError::Store` if `id` is absent
    pub fn begin_drag(&self, id: &NodeId) -> Result<(), EngineError> {
        let mut drag = self.drag.lock();
        if let Some(active) = drag.as_ref() {
            return Err(EngineError::DragInProgress(active.node().clone()));
        }
        *drag = Some(DragGesture::begin(&self.store.read(), id)?);
        Ok(())
    }

    /// Move the dragged node (and its subtree) to `position`
    ///
    /// # Errors
    /// - `EngineError::NoActiveDrag` without `begin_drag`
    pub fn drag_to(&self, position: Position) -> Result<CascadeOutcome, EngineError> {
        let mut drag = self.drag.lock();
        let gesture = drag.as_mut().ok_or(EngineError::NoActiveDrag)?;
        Ok(gesture.update(&mut self.store.write(), position))
    }

    /// Finish the gesture and persist every moved node's final position
    ///
    /// # Errors
    /// - `EngineError::NoActiveDrag` without `begin_drag`
    pub fn end_drag(&self) -> Result<PersistBatch, EngineError> {
        let gesture = self.drag.lock().take().ok_or(EngineError::NoActiveDrag)?;
        let summary = gesture.finish();
        tracing::debug!(node = %summary.node, delta = ?summary.total_delta, count = summary.moved.len(), "drag finished");
        Ok(self.persist_positions(&summary.moved))
    }

    /// One-shot cascaded move from `prior` to `new`, persisted immediately
    ///
    /// # Errors
    /// - `EngineError::Store` if `id` is absent
    pub fn move_node(
        &self,
        id: &NodeId,
        prior: Position,
        new: Position,
    ) -> Result<PersistBatch, EngineError> {
        let outcome = cascade::apply_move(&mut self.store.write(), id, prior, new)?;
        Ok(self.persist_positions(&outcome.moved))
    }

    fn persist_positions(&self, moved: &[NodeId]) -> PersistBatch {
        let positions: Vec<(NodeId, Position)> = {
            let store = self.store.read();
            moved
                .iter()
                .filter_map(|id| store.node(id).map(|n| (id.clone(), n.position)))
                .collect()
        };
        let writes = positions
            .into_iter()
            .map(|(id, position)| self.coordinator.send_unguarded(&id, NodePatch::position(position)))
            .collect();
        PersistBatch { writes }
    }

    /// Ask the remote for new ideas under `id` and merge them
    ///
    /// The parent's current position is read at call time. The busy check
    /// happens before the first suspension point.
    ///
    /// # Errors
    /// - `EngineError::DivergenceBusy` if another divergence is in flight
    /// - `EngineError::NodeNotFound` if `id` is absent (or deleted before the reply)
    /// - `EngineError::MalformedBatch` if the reply would break the tree
    /// - `EngineError::Remote` / `EngineError::Timeout` on remote failure
    #[tracing::instrument(skip(self), fields(node = %id))]
    pub async fn diverge(&self, id: &NodeId) -> Result<MergeOutcome, EngineError> {
        let _permit = self.gate.try_acquire()?;

        let position = self
            .store
            .read()
            .node(id)
            .map(|n| n.position)
            .ok_or_else(|| EngineError::NodeNotFound(id.clone()))?;
        let map_id = self.map_id.require()?;

        let batch = match bounded(
            self.config.remote_timeout(),
            self.remote.expand_node(&map_id, id, position),
        )
        .await
        {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(error = %err, "divergence failed");
                self.notices.emit(Notice::DivergenceFailed {
                    node: id.clone(),
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let outcome = {
            let mut store = self.store.write();
            let outcome = divergence::merge(&mut store, id, batch)?;
            if self.config.validate_after_merge {
                self.report_violations(&store);
            }
            outcome
        };
        Ok(outcome)
    }

    /// Create a manual child under `parent`, appended once the remote confirms
    ///
    /// # Errors
    /// - `EngineError::NodeNotFound` if `parent` is absent
    /// - `EngineError::MalformedBatch` if the reply's edge does not match or the
    ///   node claims to be a root
    /// - `EngineError::Remote` / `EngineError::Timeout` on remote failure
    #[tracing::instrument(skip(self, content))]
    pub async fn add_child(
        &self,
        parent: &NodeId,
        content: impl Into<String>,
    ) -> Result<Node, EngineError> {
        let content = content.into();
        let position = self
            .store
            .read()
            .node(parent)
            .map(|n| n.position)
            .ok_or_else(|| EngineError::NodeNotFound(parent.clone()))?;
        let map_id = self.map_id.require()?;

        let created = match bounded(
            self.config.remote_timeout(),
            self.remote.add_child(&map_id, parent, &content, position),
        )
        .await
        {
            Ok(created) => created,
            Err(err) => {
                tracing::warn!(error = %err, "manual add failed");
                self.notices.emit(Notice::ChildAddFailed {
                    parent: parent.clone(),
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        if created.node.is_root() {
            return Err(EngineError::MalformedBatch(format!(
                "manual child {} claims to be a root",
                created.node.id
            )));
        }
        if &created.edge.source != parent || created.edge.target != created.node.id {
            return Err(EngineError::MalformedBatch(format!(
                "child edge {} -> {} does not attach {} to {parent}",
                created.edge.source, created.edge.target, created.node.id
            )));
        }

        let mut store = self.store.write();
        let level = store
            .node(parent)
            .map(|p| p.level + 1)
            .ok_or_else(|| EngineError::NodeNotFound(parent.clone()))?;
        let node = created.node.with_level(level);
        let added = store.add_child(parent, node)?.clone();
        tracing::info!(node = %added.id, "manual child added");
        Ok(added)
    }

    /// Describe what deleting `id` would remove
    ///
    /// # Errors
    /// - `EngineError::MapNotLoaded` before `open`
    /// - `EngineError::NodeNotFound` if `id` is absent
    /// - `EngineError::RootProtected` for the root
    pub fn plan_deletion(&self, id: &NodeId) -> Result<DeletionPlan, EngineError> {
        let map_id = self.map_id.require()?;
        let store = self.store.read();
        let node = store
            .node(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.clone()))?;
        if node.is_root() {
            return Err(EngineError::RootProtected);
        }

        let mut affected = vec![id.clone()];
        affected.extend(store.descendants(id));
        Ok(DeletionPlan {
            map_id,
            target: id.clone(),
            affected,
        })
    }

    /// Delete a confirmed plan's target and subtree
    ///
    /// Removes the ids the remote reports plus the target's current local
    /// closure, and every edge touching them. Nothing changes locally if the
    /// remote call fails.
    ///
    /// # Errors
    /// - `EngineError::StaleDeletionPlan` if another map was opened since planning
    /// - `EngineError::Remote` / `EngineError::Timeout` on remote failure
    /// - `EngineError::Store` if the remote reports the root as deleted
    #[tracing::instrument(skip(self, plan), fields(node = %plan.target))]
    pub async fn delete(&self, plan: DeletionPlan) -> Result<Vec<NodeId>, EngineError> {
        if self.map_id.current().as_ref() != Some(&plan.map_id) {
            return Err(EngineError::StaleDeletionPlan);
        }

        let reported = match bounded(
            self.config.remote_timeout(),
            self.remote.delete_node(&plan.map_id, &plan.target),
        )
        .await
        {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(error = %err, "delete failed");
                self.notices.emit(Notice::DeleteFailed {
                    node: plan.target.clone(),
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let mut store = self.store.write();
        let mut ids: HashSet<NodeId> = reported.iter().cloned().collect();
        let local: Vec<NodeId> = std::iter::once(plan.target.clone())
            .chain(store.descendants(&plan.target))
            .filter(|id| store.contains(id))
            .collect();
        let extra = local.iter().filter(|id| !ids.contains(*id)).count();
        if extra > 0 {
            tracing::warn!(extra, "remote deletion closure missed local descendants");
        }
        ids.extend(local);

        let (nodes, edges) = store.purge(&ids)?;
        tracing::info!(nodes, edges, "subtree deleted");

        let mut removed = reported;
        let mut seen: HashSet<NodeId> = removed.iter().cloned().collect();
        for id in ids {
            if seen.insert(id.clone()) {
                removed.push(id);
            }
        }
        Ok(removed)
    }

    /// Derived view for a built-in mode
    #[must_use]
    pub fn view(&self, mode: ViewMode) -> GraphView {
        view::filter_mode(&self.store.read(), mode)
    }

    /// Derived view for an arbitrary node predicate
    pub fn view_where(&self, predicate: impl Fn(&Node) -> bool) -> GraphView {
        view::filter(&self.store.read(), predicate)
    }

    fn report_violations(&self, store: &GraphStore) {
        let report = TreeValidator::new().check(store);
        for violation in &report.violations {
            tracing::error!(?violation, "tree invariant violated");
        }
    }
}
