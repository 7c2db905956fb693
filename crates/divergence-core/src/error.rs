//! Error types for the divergence engine
//!
//! Provides error handling for:
//! - Graph store precondition violations
//! - Remote collaborator failures
//! - Engine-level protocol errors (busy divergence, missing map, drag state)

use crate::types::NodeId;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No map has been opened yet
    #[error("no mind map is loaded")]
    MapNotLoaded,

    /// Node is not in the graph store
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Root cannot be deleted
    #[error("the root node cannot be deleted")]
    RootProtected,

    /// Another divergence request is in flight
    #[error("a divergence request is already in flight")]
    DivergenceBusy,

    /// Remote returned a batch that would break the tree
    #[error("malformed divergence batch: {0}")]
    MalformedBatch(String),

    /// Graph store rejected the change
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Remote collaborator failed
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Remote call exceeded the configured timeout
    #[error("remote call timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// `drag_to`/`end_drag` without `begin_drag`
    #[error("no drag gesture is active")]
    NoActiveDrag,

    /// `begin_drag` while another gesture is active
    #[error("a drag gesture is already active on {0}")]
    DragInProgress(NodeId),

    /// Deletion plan was built against a different map
    #[error("deletion plan no longer matches the loaded map")]
    StaleDeletionPlan,

    /// Background write task did not complete
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::DivergenceBusy => true,
            Self::Remote(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Whether the UI should surface this error to the user
    #[inline]
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Remote(_) | Self::Timeout { .. } | Self::DivergenceBusy | Self::RootProtected
        )
    }
}

/// Graph store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Node not found
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Node id already present
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// Operation would remove the root
    #[error("root node {0} cannot be removed")]
    RootProtected(NodeId),

    /// Parent of a new child is missing
    #[error("parent {0} is not in the store")]
    MissingParent(NodeId),
}

/// Failures reported by (or while reaching) the remote collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Network-level failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Remote answered with an error status
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Map or node unknown to the remote
    #[error("not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::NotFound(_) => false,
        }
    }
}
