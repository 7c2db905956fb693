//! Descendant resolution over the parent→child edge set
//!
//! Computes the downward closure of a node. The traversal keeps a visited set,
//! so malformed data (cycles, multi-parent nodes) still terminates; for such
//! data the output order is unspecified.

use crate::types::{Edge, NodeId};
use std::collections::{HashMap, HashSet, VecDeque};

/// Adjacency list: parent id → child ids in edge order
pub(crate) fn children_index(edges: &[Edge]) -> HashMap<&NodeId, Vec<&NodeId>> {
    let mut index: HashMap<&NodeId, Vec<&NodeId>> = HashMap::with_capacity(edges.len());
    for edge in edges {
        index.entry(&edge.source).or_default().push(&edge.target);
    }
    index
}

/// All ids reachable from `start` by following edges downward, excluding
/// `start` itself, in breadth-first discovery order.
///
/// # Example
///
/// ```
/// use divergence_core::descendants::descendants;
/// use divergence_core::types::{Edge, NodeId};
///
/// let edges = vec![Edge::new("A", "B"), Edge::new("B", "C")];
/// let ids = descendants(&edges, &NodeId::new("A"));
/// assert_eq!(ids, vec![NodeId::new("B"), NodeId::new("C")]);
/// ```
#[must_use]
pub fn descendants(edges: &[Edge], start: &NodeId) -> Vec<NodeId> {
    let index = children_index(edges);

    let mut visited: HashSet<&NodeId> = HashSet::new();
    visited.insert(start);

    let mut queue: VecDeque<&NodeId> = VecDeque::new();
    queue.push_back(start);

    let mut out = Vec::new();
    while let Some(current) = queue.pop_front() {
        let Some(children) = index.get(current) else {
            continue;
        };
        for &child in children {
            if visited.insert(child) {
                out.push(child.clone());
                queue.push_back(child);
            }
        }
    }
    out
}

/// Same closure as [`descendants`], as a set
#[must_use]
pub fn descendant_set(edges: &[Edge], start: &NodeId) -> HashSet<NodeId> {
    descendants(edges, start).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s)
    }

    fn sample_edges() -> Vec<Edge> {
        vec![
            Edge::new("A", "B"),
            Edge::new("B", "C"),
            Edge::new("B", "D"),
            Edge::new("D", "E"),
        ]
    }

    #[test]
    fn resolves_subtree_minus_self() {
        let edges = sample_edges();

        assert_eq!(
            descendant_set(&edges, &id("B")),
            ["C", "D", "E"].into_iter().map(id).collect()
        );
        assert_eq!(
            descendant_set(&edges, &id("A")),
            ["B", "C", "D", "E"].into_iter().map(id).collect()
        );
        assert!(descendants(&edges, &id("C")).is_empty());
    }

    #[test]
    fn breadth_first_order() {
        let edges = sample_edges();
        let order = descendants(&edges, &id("A"));
        assert_eq!(order, vec![id("B"), id("C"), id("D"), id("E")]);
    }

    #[test]
    fn unknown_node_has_no_descendants() {
        assert!(descendants(&sample_edges(), &id("Z")).is_empty());
    }

    #[test]
    fn terminates_on_cycle_and_excludes_start() {
        let edges = vec![
            Edge::new("A", "B"),
            Edge::new("B", "C"),
            Edge::new("C", "A"),
        ];
        let set = descendant_set(&edges, &id("A"));
        assert_eq!(set, ["B", "C"].into_iter().map(id).collect());
    }

    #[test]
    fn multi_parent_node_visited_once() {
        let edges = vec![
            Edge::new("A", "B"),
            Edge::new("A", "C"),
            Edge::new("B", "D"),
            Edge::new("C", "D"),
        ];
        let order = descendants(&edges, &id("A"));
        assert_eq!(order.iter().filter(|n| n.as_str() == "D").count(), 1);
        assert_eq!(order.len(), 3);
    }
}
