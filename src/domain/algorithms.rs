//! Recursive tree algorithms.
//!
//! All functions recurse over the children relation; the ownership rules of
//! the arena (a node has exactly one parent, cycles cannot be constructed)
//! guarantee termination. Synthetic session roots carry no id and are
//! excluded from every duplicate-id set.

use std::collections::HashSet;

use itertools::Itertools;

use crate::domain::element::{Element, NodeId};
use crate::domain::lifecycle::Operation;
use crate::domain::record::Key;

/// Depth-first pre-order flattening: the node itself, then each child's
/// flatten result in insertion order.
pub fn flatten<K: Key>(tree: &Element<K>, node: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    flatten_into(tree, node, &mut out);
    out
}

fn flatten_into<K: Key>(tree: &Element<K>, node: NodeId, out: &mut Vec<NodeId>) {
    if let Some(n) = tree.node(node) {
        out.push(node);
        for &child in n.children() {
            flatten_into(tree, child, out);
        }
    }
}

/// Depth-first search stopping at the first node carrying `id`.
pub fn find_by_id<K: Key>(tree: &Element<K>, node: NodeId, id: &K) -> Option<NodeId> {
    let n = tree.node(node)?;
    if n.id() == Some(id) {
        return Some(node);
    }
    n.children()
        .iter()
        .find_map(|&child| find_by_id(tree, child, id))
}

/// All ids in the subtree, pre-order, roots skipped.
pub fn subtree_ids<K: Key>(tree: &Element<K>, node: NodeId) -> Vec<K> {
    flatten(tree, node)
        .into_iter()
        .filter_map(|n| tree.node(n).and_then(|n| n.id().cloned()))
        .collect()
}

/// True when two nodes within one subtree share an id.
pub fn has_duplicate_id<K: Key>(tree: &Element<K>, node: NodeId) -> bool {
    !subtree_ids(tree, node).iter().all_unique()
}

/// First id carried by more than one node in the subtree, if any.
pub fn first_internal_duplicate<K: Key>(tree: &Element<K>, node: NodeId) -> Option<K> {
    subtree_ids(tree, node).into_iter().duplicates().next()
}

/// First id that appears both in the source subtree and the target subtree,
/// if any. The shared-id rule across trees: the target's id set is built
/// first, then each source id is probed against it.
pub fn first_duplicate_across<K: Key>(
    source: &Element<K>,
    source_node: NodeId,
    target: &Element<K>,
    target_node: NodeId,
) -> Option<K> {
    let target_ids: HashSet<K> = subtree_ids(target, target_node).into_iter().collect();
    subtree_ids(source, source_node)
        .into_iter()
        .find(|id| target_ids.contains(id))
}

/// True when any id of the source subtree already exists in the target.
pub fn has_duplicate_id_across<K: Key>(
    source: &Element<K>,
    source_node: NodeId,
    target: &Element<K>,
    target_node: NodeId,
) -> bool {
    first_duplicate_across(source, source_node, target, target_node).is_some()
}

/// Depth-first short-circuiting scan for the first node whose lifecycle
/// state forbids `operation`.
pub fn find_state_violation<K: Key>(
    tree: &Element<K>,
    node: NodeId,
    operation: Operation,
) -> Option<NodeId> {
    let n = tree.node(node)?;
    if !n.state().permits(operation) {
        return Some(node);
    }
    n.children()
        .iter()
        .find_map(|&child| find_state_violation(tree, child, operation))
}

/// True when any node in the subtree is in a state that forbids `operation`.
pub fn any_violates_state<K: Key>(
    tree: &Element<K>,
    node: NodeId,
    operation: Operation,
) -> bool {
    find_state_violation(tree, node, operation).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lifecycle::Operation;

    fn leaf(id: u32) -> Element<u32> {
        Element::new(id, None, None)
    }

    /// 1 -> (2 -> 4, 3)
    fn sample() -> Element<u32> {
        let mut e = leaf(1);
        let root = e.root();
        let two = e.add_child(root, leaf(2)).unwrap();
        e.add_child(root, leaf(3)).unwrap();
        e.add_child(two, leaf(4)).unwrap();
        e
    }

    #[test]
    fn flatten_is_preorder_in_insertion_order() {
        let e = sample();
        let ids = subtree_ids(&e, e.root());
        assert_eq!(ids, vec![1, 2, 4, 3]);
    }

    #[test]
    fn find_by_id_stops_at_first_match() {
        let e = sample();
        let four = find_by_id(&e, e.root(), &4).unwrap();
        assert_eq!(e.node(four).unwrap().id(), Some(&4));
        assert!(find_by_id(&e, e.root(), &9).is_none());
    }

    #[test]
    fn duplicate_detection_within_one_tree() {
        let mut e = sample();
        assert!(!has_duplicate_id(&e, e.root()));
        let root = e.root();
        e.add_child(root, leaf(4)).unwrap();
        assert!(has_duplicate_id(&e, e.root()));
    }

    #[test]
    fn duplicate_detection_across_trees() {
        let a = sample();
        let mut b = leaf(10);
        let b_root = b.root();
        b.add_child(b_root, leaf(11)).unwrap();
        assert!(!has_duplicate_id_across(&a, a.root(), &b, b.root()));

        b.add_child(b_root, leaf(3)).unwrap();
        assert_eq!(first_duplicate_across(&a, a.root(), &b, b.root()), Some(3));
    }

    #[test]
    fn state_scan_short_circuits_on_first_violation() {
        let mut e = sample();
        // Fresh nodes are NotExisted: persist is fine, cut is not.
        assert!(!any_violates_state(&e, e.root(), Operation::Persist));
        assert!(any_violates_state(&e, e.root(), Operation::Cut));

        let root = e.root();
        e.mark_attached(root, &"s".to_string());
        assert!(!any_violates_state(&e, e.root(), Operation::Cut));
        assert!(any_violates_state(&e, e.root(), Operation::Persist));
    }
}
