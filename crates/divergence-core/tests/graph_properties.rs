use divergence_core::{
    apply_move, descendant_set, view, Edge, GraphStore, Node, NodeId, Position, TreeValidator,
    ViewMode,
};
use proptest::prelude::*;
use proptest::sample::Index;
use std::collections::HashSet;

/// Random tree: node `i + 1` hangs under one of nodes `0..=i`
fn build_tree(parents: &[Index], marks: &[bool]) -> (GraphStore, Vec<usize>) {
    let name = |i: usize| NodeId::new(format!("n{i}"));
    let mut parent_of = vec![usize::MAX];
    let mut nodes = vec![Node::root(name(0), "root", Position::ORIGIN)];
    let mut edges = Vec::new();
    let mut levels = vec![0u32];

    for (i, pick) in parents.iter().enumerate() {
        let child = i + 1;
        let parent = pick.index(child);
        parent_of.push(parent);
        levels.push(levels[parent] + 1);
        #[allow(clippy::cast_precision_loss)]
        let at = Position::new(child as f64 * 10.0, levels[child] as f64 * 100.0);
        nodes.push(
            Node::new(name(child), format!("idea {child}"), at)
                .with_level(levels[child])
                .marked(marks.get(child).copied().unwrap_or(false)),
        );
        edges.push(Edge::new(name(parent), name(child)));
    }

    (GraphStore::from_parts(nodes, edges).unwrap(), parent_of)
}

fn is_ancestor(parent_of: &[usize], ancestor: usize, mut node: usize) -> bool {
    while node != 0 {
        node = parent_of[node];
        if node == ancestor {
            return true;
        }
    }
    false
}

proptest! {
    #[test]
    fn generated_trees_are_valid(parents in proptest::collection::vec(any::<Index>(), 0..40)) {
        let (store, _) = build_tree(&parents, &[]);
        prop_assert!(TreeValidator::new().check(&store).is_valid());
    }

    #[test]
    fn descendants_match_ancestry(
        parents in proptest::collection::vec(any::<Index>(), 0..40),
        start in any::<Index>(),
    ) {
        let (store, parent_of) = build_tree(&parents, &[]);
        let start = start.index(parent_of.len());

        let found = descendant_set(store.edges(), &NodeId::new(format!("n{start}")));
        let expected: HashSet<NodeId> = (0..parent_of.len())
            .filter(|&n| is_ancestor(&parent_of, start, n))
            .map(|n| NodeId::new(format!("n{n}")))
            .collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn cascade_preserves_subtree_offsets(
        parents in proptest::collection::vec(any::<Index>(), 0..40),
        target in any::<Index>(),
        dx in -500i32..500,
        dy in -500i32..500,
    ) {
        let (mut store, parent_of) = build_tree(&parents, &[]);
        let before = store.clone();
        let target = target.index(parent_of.len());
        let id = NodeId::new(format!("n{target}"));
        let prior = store.node(&id).unwrap().position;
        let delta = Position::new(f64::from(dx), f64::from(dy));

        let outcome = apply_move(&mut store, &id, prior, prior + delta).unwrap();

        for (i, node) in before.nodes().enumerate() {
            let now = store.node(&node.id).unwrap().position;
            let in_subtree = i == target || is_ancestor(&parent_of, target, i);
            if in_subtree && !delta.is_zero() {
                prop_assert_eq!(now, node.position + delta);
                prop_assert!(outcome.moved.contains(&node.id));
            } else {
                prop_assert_eq!(now, node.position);
            }
        }
        prop_assert_eq!(store.edges(), before.edges());
    }

    #[test]
    fn marked_view_is_edge_induced(
        parents in proptest::collection::vec(any::<Index>(), 0..40),
        marks in proptest::collection::vec(any::<bool>(), 41),
    ) {
        let (store, _) = build_tree(&parents, &marks);
        let shown = view::filter_mode(&store, ViewMode::MarkedOnly);
        let visible = shown.node_ids();

        let marked: HashSet<NodeId> = store.nodes().filter(|n| n.is_marked).map(|n| n.id.clone()).collect();
        prop_assert_eq!(&visible, &marked);
        for edge in store.edges() {
            let both = visible.contains(&edge.source) && visible.contains(&edge.target);
            prop_assert_eq!(shown.edges.contains(edge), both);
        }
        prop_assert_eq!(view::filter_mode(&store, ViewMode::All).nodes.len(), store.len());
    }
}

#[test]
fn cycle_in_loaded_edges_terminates() {
    let store = GraphStore::from_parts(
        vec![
            Node::root("A", "root", Position::ORIGIN),
            Node::new("B", "b", Position::ORIGIN),
            Node::new("C", "c", Position::ORIGIN),
        ],
        vec![Edge::new("A", "B"), Edge::new("B", "C"), Edge::new("C", "B")],
    )
    .unwrap();

    let found = descendant_set(store.edges(), &NodeId::new("B"));
    assert_eq!(found, HashSet::from([NodeId::new("C")]));
}
