//! Tree validator
//!
//! The edge set is expected to form a tree rooted at the single root node.
//! Nothing in the store enforces that on load, so this reports every breach
//! it finds. Violations are diagnostics, never fatal.

use crate::descendants::descendants;
use crate::store::GraphStore;
use crate::types::NodeId;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// One breach of the tree shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TreeViolation {
    /// No node is tagged root
    MissingRoot,
    /// More than one node is tagged root
    MultipleRoots { roots: Vec<NodeId> },
    /// The root has an incoming edge
    RootHasParent { root: NodeId },
    /// A non-root node has more than one incoming edge
    MultipleParents { node: NodeId, parents: usize },
    /// A non-root node has no incoming edge
    OrphanNode { node: NodeId },
    /// An edge names a node that is not stored
    DanglingEdge { source: NodeId, target: NodeId },
    /// A node cannot be reached from the root (cycle or detached subtree)
    Unreachable { node: NodeId },
    /// Stored level differs from the depth below the root
    LevelMismatch { node: NodeId, expected: u32, actual: u32 },
}

/// Validation result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Everything found, in check order
    pub violations: Vec<TreeViolation>,
}

impl ValidationReport {
    /// No violations
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Checks the tree invariants of a [`GraphStore`]
#[derive(Debug, Clone, Copy)]
pub struct TreeValidator {
    check_levels: bool,
}

impl TreeValidator {
    /// Validator checking structure and levels
    #[must_use]
    pub fn new() -> Self {
        Self { check_levels: true }
    }

    /// Skip the level check
    #[must_use]
    pub fn structure_only() -> Self {
        Self {
            check_levels: false,
        }
    }

    /// Run every check
    #[must_use]
    pub fn check(&self, store: &GraphStore) -> ValidationReport {
        let mut violations = Vec::new();

        let roots: Vec<NodeId> = store
            .nodes()
            .filter(|n| n.is_root())
            .map(|n| n.id.clone())
            .collect();
        match roots.len() {
            0 => violations.push(TreeViolation::MissingRoot),
            1 => {}
            _ => violations.push(TreeViolation::MultipleRoots {
                roots: roots.clone(),
            }),
        }

        let mut incoming: HashMap<&NodeId, usize> = HashMap::new();
        for edge in store.edges() {
            if !store.contains(&edge.source) || !store.contains(&edge.target) {
                violations.push(TreeViolation::DanglingEdge {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                });
            }
            *incoming.entry(&edge.target).or_default() += 1;
        }

        for node in store.nodes() {
            let parents = incoming.get(&node.id).copied().unwrap_or(0);
            if node.is_root() {
                if parents > 0 {
                    violations.push(TreeViolation::RootHasParent {
                        root: node.id.clone(),
                    });
                }
            } else if parents == 0 {
                violations.push(TreeViolation::OrphanNode {
                    node: node.id.clone(),
                });
            } else if parents > 1 {
                violations.push(TreeViolation::MultipleParents {
                    node: node.id.clone(),
                    parents,
                });
            }
        }

        if let [root] = roots.as_slice() {
            let reachable: HashSet<NodeId> = descendants(store.edges(), root).into_iter().collect();
            for node in store.nodes() {
                if &node.id != root && incoming.contains_key(&node.id) && !reachable.contains(&node.id) {
                    violations.push(TreeViolation::Unreachable {
                        node: node.id.clone(),
                    });
                }
            }

            if self.check_levels {
                for (id, depth) in depths(store, root) {
                    let Some(node) = store.node(&id) else { continue };
                    if node.level != depth {
                        violations.push(TreeViolation::LevelMismatch {
                            node: id,
                            expected: depth,
                            actual: node.level,
                        });
                    }
                }
            }
        }

        ValidationReport { violations }
    }
}

impl Default for TreeValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Breadth-first depth of every node reachable from `root`
fn depths(store: &GraphStore, root: &NodeId) -> Vec<(NodeId, u32)> {
    let mut seen: HashSet<&NodeId> = HashSet::new();
    let mut queue: VecDeque<(&NodeId, u32)> = VecDeque::new();
    let mut out = Vec::with_capacity(store.len());

    seen.insert(root);
    queue.push_back((root, 0));
    while let Some((id, depth)) = queue.pop_front() {
        out.push((id.clone(), depth));
        for child in store.children(id) {
            if seen.insert(child) {
                queue.push_back((child, depth + 1));
            }
        }
    }
    out
}
