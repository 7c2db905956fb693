//! Failure notices for the UI layer
//!
//! Every remote failure the engine absorbs (reverted or not) is reported here.
//! The channel is bounded and sending never waits: when the UI falls behind,
//! notices are dropped with a warning.

use crate::types::{NodeField, NodeId};
use serde::Serialize;
use tokio::sync::mpsc;

/// A remote failure the user should hear about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notice {
    /// Guarded write failed; local value restored
    Reverted {
        node: NodeId,
        field: NodeField,
        error: String,
    },
    /// Unguarded write failed; local value kept (client/server drift)
    WriteFailed {
        node: NodeId,
        field: NodeField,
        error: String,
    },
    /// Manual child could not be created
    ChildAddFailed { parent: NodeId, error: String },
    /// Deletion failed; nothing removed locally
    DeleteFailed { node: NodeId, error: String },
    /// Divergence request failed; nothing merged
    DivergenceFailed { node: NodeId, error: String },
}

impl Notice {
    /// Node the notice is about
    #[must_use]
    pub fn node(&self) -> &NodeId {
        match self {
            Notice::Reverted { node, .. }
            | Notice::WriteFailed { node, .. }
            | Notice::DeleteFailed { node, .. }
            | Notice::DivergenceFailed { node, .. } => node,
            Notice::ChildAddFailed { parent, .. } => parent,
        }
    }
}

/// Non-blocking sending half
#[derive(Debug, Clone)]
pub struct NoticeSender {
    inner: mpsc::Sender<Notice>,
}

impl NoticeSender {
    /// Queue a notice, dropping it if the receiver is full or gone
    pub fn emit(&self, notice: Notice) {
        if let Err(err) = self.inner.try_send(notice) {
            tracing::warn!(error = %err, "notice dropped");
        }
    }
}

/// Create a bounded notice channel
#[must_use]
pub fn channel(capacity: usize) -> (NoticeSender, mpsc::Receiver<Notice>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (NoticeSender { inner: tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_delivers() {
        let (tx, mut rx) = channel(4);
        tx.emit(Notice::DeleteFailed {
            node: NodeId::new("B"),
            error: "boom".into(),
        });

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.node(), &NodeId::new("B"));
    }

    #[tokio::test]
    async fn emit_drops_when_full() {
        let (tx, mut rx) = channel(1);
        for n in ["a", "b"] {
            tx.emit(Notice::ChildAddFailed {
                parent: NodeId::new(n),
                error: String::new(),
            });
        }

        assert_eq!(rx.recv().await.unwrap().node().as_str(), "a");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(Notice::Reverted {
            node: NodeId::new("n"),
            field: NodeField::IsMarked,
            error: "x".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "reverted");
        assert_eq!(json["field"], "isMarked");
    }
}
