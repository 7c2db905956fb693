//! Core types for the divergence engine
//!
//! Defines the data model shared by every component:
//! - Node and map identifiers
//! - Canvas positions and deltas
//! - Idea nodes and parent→child edges
//! - Partial node updates and remote payloads

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Opaque node identifier (assigned by the remote collaborator)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap a remote-assigned identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of one mind map (one per design topic)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(String);

impl MapId {
    /// Wrap a remote-assigned map identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MapId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Point (or delta) in canvas space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Position {
    /// Canvas origin / zero delta
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Create a position
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// True only for an exact `(0, 0)`; no epsilon.
    #[inline]
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl Add for Position {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Position {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// How a node came to exist (display only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceType {
    /// Root of the map
    Root,
    /// AI-expanded sibling idea
    Horizontal,
    /// Manually added child
    Vertical,
}

/// A single idea on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Remote-assigned identifier
    pub id: NodeId,
    /// Canvas position
    pub position: Position,
    /// Free-form label
    pub content: String,
    /// User "starred idea" flag
    pub is_marked: bool,
    /// Produced by a divergence request
    #[serde(rename = "isAIGenerated")]
    pub is_ai_generated: bool,
    /// Depth from the root (display emphasis only)
    pub level: u32,
    /// Provenance tag
    pub divergence_type: DivergenceType,
}

impl Node {
    /// Create a manually added node at level 1
    #[must_use]
    pub fn new(id: impl Into<NodeId>, content: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            position,
            content: content.into(),
            is_marked: false,
            is_ai_generated: false,
            level: 1,
            divergence_type: DivergenceType::Vertical,
        }
    }

    /// Create the root node of a map
    #[must_use]
    pub fn root(id: impl Into<NodeId>, content: impl Into<String>, position: Position) -> Self {
        Self {
            level: 0,
            divergence_type: DivergenceType::Root,
            ..Self::new(id, content, position)
        }
    }

    /// With depth
    #[inline]
    #[must_use]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// With provenance tag
    #[inline]
    #[must_use]
    pub fn with_divergence_type(mut self, divergence_type: DivergenceType) -> Self {
        self.divergence_type = divergence_type;
        self
    }

    /// Mark as AI-generated sibling idea
    #[inline]
    #[must_use]
    pub fn ai_generated(mut self) -> Self {
        self.is_ai_generated = true;
        self.divergence_type = DivergenceType::Horizontal;
        self
    }

    /// With marked flag
    #[inline]
    #[must_use]
    pub fn marked(mut self, is_marked: bool) -> Self {
        self.is_marked = is_marked;
        self
    }

    /// Is this the map root
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.divergence_type == DivergenceType::Root
    }

    /// Overwrite the fields present in `patch`
    pub fn apply(&mut self, patch: &NodePatch) {
        if let Some(content) = &patch.content {
            self.content.clone_from(content);
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(is_marked) = patch.is_marked {
            self.is_marked = is_marked;
        }
    }
}

/// Directed parent→child link: `target` is a direct child of `source`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Parent
    pub source: NodeId,
    /// Child
    pub target: NodeId,
}

impl Edge {
    /// Create an edge
    #[inline]
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Whether either endpoint is `id`
    #[inline]
    #[must_use]
    pub fn touches(&self, id: &NodeId) -> bool {
        &self.source == id || &self.target == id
    }
}

/// Mutable node fields, used to label writes in logs and notices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeField {
    /// `content`
    Content,
    /// `position`
    Position,
    /// `isMarked`
    IsMarked,
}

impl fmt::Display for NodeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeField::Content => "content",
            NodeField::Position => "position",
            NodeField::IsMarked => "isMarked",
        };
        f.write_str(name)
    }
}

/// Partial update among `{content, position, isMarked}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    /// New label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// New absolute position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// New marked flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_marked: Option<bool>,
}

impl NodePatch {
    /// Content-only patch
    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Position-only patch
    #[must_use]
    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    /// Mark-only patch
    #[must_use]
    pub fn marked(is_marked: bool) -> Self {
        Self {
            is_marked: Some(is_marked),
            ..Self::default()
        }
    }

    /// No fields supplied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.position.is_none() && self.is_marked.is_none()
    }

    /// First field carried by this patch, for labelling
    #[must_use]
    pub fn field(&self) -> Option<NodeField> {
        if self.is_marked.is_some() {
            Some(NodeField::IsMarked)
        } else if self.position.is_some() {
            Some(NodeField::Position)
        } else if self.content.is_some() {
            Some(NodeField::Content)
        } else {
            None
        }
    }
}

/// Full map as returned by get-or-create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSnapshot {
    /// Map identifier
    pub map_id: MapId,
    /// Every node
    pub nodes: Vec<Node>,
    /// Every edge
    pub edges: Vec<Edge>,
}

/// New ideas generated under one parent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DivergenceBatch {
    /// Generated nodes
    pub nodes: Vec<Node>,
    /// One edge per node, each from the expanded parent
    pub edges: Vec<Edge>,
}

/// Result of adding a manual child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildCreated {
    /// The new node
    pub node: Node,
    /// Edge from the parent to the new node
    pub edge: Edge,
}
