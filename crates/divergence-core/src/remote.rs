//! Remote collaborator contract
//!
//! The engine owns no persistence. Every durable change goes through this
//! trait; implementations are the dashboard API client in production and
//! [`crate::memory::InMemoryCollaborator`] in-process.

use crate::error::{EngineError, RemoteError};
use crate::types::{ChildCreated, DivergenceBatch, MapId, MapSnapshot, Node, NodeId, NodePatch, Position};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Request/response operations consumed by the engine
#[async_trait]
pub trait RemoteCollaborator: Send + Sync + 'static {
    /// Load the map for a topic, creating it (root titled `topic_title`) on first access
    async fn get_or_create_map(
        &self,
        topic_id: &str,
        topic_title: &str,
    ) -> Result<MapSnapshot, RemoteError>;

    /// Generate child ideas under `node_id`, placed around `position`
    async fn expand_node(
        &self,
        map_id: &MapId,
        node_id: &NodeId,
        position: Position,
    ) -> Result<DivergenceBatch, RemoteError>;

    /// Write the supplied fields of one node
    async fn update_node(
        &self,
        map_id: &MapId,
        node_id: &NodeId,
        patch: NodePatch,
    ) -> Result<Option<Node>, RemoteError>;

    /// Delete a node and its subtree, returning every deleted id
    async fn delete_node(&self, map_id: &MapId, node_id: &NodeId)
        -> Result<Vec<NodeId>, RemoteError>;

    /// Create a manual child under `parent_id`
    async fn add_child(
        &self,
        map_id: &MapId,
        parent_id: &NodeId,
        content: &str,
        parent_position: Position,
    ) -> Result<ChildCreated, RemoteError>;
}

/// Run a remote call under `limit`
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(EngineError::from),
        Err(_) => Err(EngineError::Timeout {
            duration_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
