//! Divergence Core - creative divergence graph engine
//!
//! Client-side state for an idea tree ("mind map"):
//! - Holds the canonical node/edge store for one map
//! - Cascades drags to whole subtrees
//! - Applies guarded edits optimistically and reverts them on remote failure
//! - Merges remote-generated divergence batches without clobbering edits
//! - Deletes confirmed subtrees and derives filtered views
//!
//! # Example
//!
//! ```rust,no_run
//! use divergence_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), EngineError> {
//! let remote = Arc::new(InMemoryCollaborator::new());
//! let engine = MindMapEngine::new(remote, EngineConfig::default());
//!
//! engine.open("topic-1", "Chairs").await?;
//! let root = engine.snapshot().root().map(|n| n.id.clone()).ok_or(EngineError::MapNotLoaded)?;
//! let merged = engine.diverge(&root).await?;
//! println!("{} new ideas", merged.added.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod cascade;
pub mod config;
pub mod descendants;
pub mod divergence;
pub mod engine;
pub mod error;
pub mod memory;
pub mod notice;
pub mod optimistic;
pub mod remote;
pub mod simulator;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod validate;
pub mod view;

// Re-exports for convenience
pub use cascade::{apply_move, CascadeOutcome, DragGesture, DragSummary};
pub use config::EngineConfig;
pub use descendants::{descendant_set, descendants};
pub use divergence::{merge, DivergenceGate, DivergencePermit, MergeOutcome};
pub use engine::{DeletionPlan, MindMapEngine, PersistBatch, PersistReport};
pub use error::{EngineError, RemoteError, StoreError};
pub use memory::{InMemoryCollaborator, RemoteOp};
pub use notice::{Notice, NoticeSender};
pub use optimistic::{GuardedField, MapIdCell, Marked, OptimisticCoordinator, PendingWrite};
pub use remote::RemoteCollaborator;
pub use simulator::{run_simulator, SimulatorConfig, SimulatorReport};
pub use store::{GraphStore, SharedStore};
pub use types::{
    ChildCreated, DivergenceBatch, DivergenceType, Edge, MapId, MapSnapshot, Node, NodeField,
    NodeId, NodePatch, Position,
};
pub use validate::{TreeValidator, TreeViolation, ValidationReport};
pub use view::{GraphView, ViewMode};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the engine
    pub use crate::{
        EngineConfig, EngineError, GraphStore, GraphView, InMemoryCollaborator, MindMapEngine,
        Node, NodeId, Notice, Position, RemoteCollaborator, ViewMode,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
