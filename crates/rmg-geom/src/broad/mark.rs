//! The mark pass: for every leaf touched since the last stamp, find its new
//! overlaps; for every leaf left untouched, replay its cached pairs instead
//! of re-testing its bounding box against the whole tree.
//!
//! This is the piece that makes reindexing cheap when only a handful of
//! objects moved: a leaf whose stamp matches the current one pays a walk
//! from itself to the root (querying one sibling subtree per level),
//! everything else pays a linked-list walk.
//!
//! The walk-up is not just an optimization over a full-tree query: it is
//! what keeps a pair from being discovered twice in one pass. When two
//! leaves both moved this stamp and overlap each other, each leaf's
//! walk-up reaches the other exactly once, at the ancestor level where
//! their paths first diverge. Which side of that meeting point a leaf
//! approaches from (`left`) decides whether it only registers the pair
//! (`left == true`, no emit — the other side will emit it) or registers
//! *and* emits (`left == false`, guarded by a stamp comparison so the pair
//! is not inserted twice when both sides are touched this stamp).

use crate::broad::node::{Node, NodeIndex, NodeKind, PairIndex};
use crate::broad::pair::{pair_insert, LeafRef, Pair};
use crate::broad::pool::Pool;
use crate::broad::tree::Partner;

fn leaf_obj<T: Copy>(nodes: &Pool<Node<T>>, index: NodeIndex) -> T {
    match nodes.get(index.0).kind {
        NodeKind::Leaf { obj, .. } => obj,
        NodeKind::Branch { .. } => unreachable!("leaf_obj called on a branch"),
    }
}

fn leaf_stamp<T: Copy>(nodes: &Pool<Node<T>>, index: NodeIndex) -> u64 {
    match nodes.get(index.0).kind {
        NodeKind::Leaf { stamp, .. } => stamp,
        NodeKind::Branch { .. } => unreachable!("leaf_stamp called on a branch"),
    }
}

fn leaf_ref_obj<T: Copy>(nodes: &Pool<Node<T>>, leaf: LeafRef<T>) -> T {
    match leaf {
        LeafRef::Owned(index) => leaf_obj(nodes, index),
        LeafRef::External(obj) => obj,
    }
}

/// Queries `subtree` (part of this same tree) against `leaf`, either
/// registering a pair silently (`left`) or registering-and-emitting it
/// (`!left`, with a stamp guard against double registration).
pub(crate) fn mark_leaf_query_self<T: Copy + Eq>(
    nodes: &mut Pool<Node<T>>,
    pairs: &mut Pool<Pair<T>>,
    subtree: NodeIndex,
    leaf: NodeIndex,
    left: bool,
    emit: &mut impl FnMut(T, T),
) {
    if !nodes.get(subtree.0).bb.intersects(&nodes.get(leaf.0).bb) {
        return;
    }

    if nodes.get(subtree.0).is_leaf() {
        if left {
            pair_insert(pairs, nodes, LeafRef::Owned(leaf), LeafRef::Owned(subtree));
        } else {
            if leaf_stamp(nodes, subtree) < leaf_stamp(nodes, leaf) {
                pair_insert(pairs, nodes, LeafRef::Owned(subtree), LeafRef::Owned(leaf));
            }
            emit(leaf_obj(nodes, leaf), leaf_obj(nodes, subtree));
        }
        return;
    }

    let (a, b) = nodes.get(subtree.0).children();
    mark_leaf_query_self(nodes, pairs, a, leaf, left, emit);
    mark_leaf_query_self(nodes, pairs, b, leaf, left, emit);
}

/// Queries a subtree of a static partner's tree against `leaf`. The
/// partner never runs its own mark pass, so there is no symmetric
/// double-discovery to guard against: every call here both registers and
/// emits unconditionally.
pub(crate) fn mark_leaf_query_partner<T: Copy + Eq>(
    partner_nodes: &Pool<Node<T>>,
    own_nodes: &mut Pool<Node<T>>,
    pairs: &mut Pool<Pair<T>>,
    subtree: NodeIndex,
    leaf: NodeIndex,
    emit: &mut impl FnMut(T, T),
) {
    let subtree_node = partner_nodes.get(subtree.0);
    if !subtree_node.bb.intersects(&own_nodes.get(leaf.0).bb) {
        return;
    }

    match subtree_node.kind {
        NodeKind::Leaf { obj: partner_obj, .. } => {
            // The owned dynamic leaf must land on the `b` side, matching
            // the self-tree path's `pair_insert(subtree, leaf)` convention
            // (mark_leaf_query_self, `!left` arm) — `replay_cached_pairs`
            // only emits a cached pair when `pair.b.leaf` is the leaf being
            // replayed, so a pair threaded with the dynamic leaf on `a`
            // would cache correctly but never replay on a later no-motion
            // frame.
            pair_insert(pairs, own_nodes, LeafRef::External(partner_obj), LeafRef::Owned(leaf));
            emit(partner_obj, leaf_obj(own_nodes, leaf));
        }
        NodeKind::Branch { a, b } => {
            mark_leaf_query_partner(partner_nodes, own_nodes, pairs, a, leaf, emit);
            mark_leaf_query_partner(partner_nodes, own_nodes, pairs, b, leaf, emit);
        }
    }
}

pub(crate) fn replay_cached_pairs<T: Copy + Eq>(
    pairs: &Pool<Pair<T>>,
    nodes: &Pool<Node<T>>,
    leaf: NodeIndex,
    head: Option<PairIndex>,
    emit: &mut impl FnMut(T, T),
) {
    let mut cursor = head;
    while let Some(index) = cursor {
        let pair = pairs.get(index.0);
        if pair.b.leaf == LeafRef::Owned(leaf) {
            emit(leaf_ref_obj(nodes, pair.a.leaf), leaf_obj(nodes, leaf));
            cursor = pair.b.next;
        } else {
            cursor = pair.a.next;
        }
    }
}

/// Marks one leaf: finds its new overlaps if it was touched this stamp, or
/// replays its cached pairs otherwise.
///
/// The touched path queries the static `partner` (if any) first, then
/// walks from `leaf` up to the root, querying exactly one sibling subtree
/// per level — the same leaf set a full-tree query excluding `leaf` would
/// visit, partitioned so each other leaf is reached exactly once.
pub fn mark_leaf<T: Copy + Eq>(
    nodes: &mut Pool<Node<T>>,
    pairs: &mut Pool<Pair<T>>,
    partner: Option<&Partner<'_, T>>,
    leaf: NodeIndex,
    stamp: u64,
    emit: &mut impl FnMut(T, T),
) {
    let (touched, cached_head) = match nodes.get(leaf.0).kind {
        NodeKind::Leaf { stamp: leaf_stamp, pairs, .. } => (leaf_stamp == stamp, pairs),
        NodeKind::Branch { .. } => unreachable!("mark_leaf called on a branch"),
    };

    if touched {
        if let Some(partner) = partner {
            if let Some(partner_root) = partner.root() {
                mark_leaf_query_partner(partner.nodes(), nodes, pairs, partner_root, leaf, emit);
            }
        }

        let mut node = leaf;
        while let Some(parent) = nodes.get(node.0).parent {
            let (a, _) = nodes.get(parent.0).children();
            let left = a == node;
            let sibling = nodes.get(parent.0).other_child(node);
            mark_leaf_query_self(nodes, pairs, sibling, leaf, left, emit);
            node = parent;
        }
    } else {
        replay_cached_pairs(pairs, nodes, leaf, cached_head, emit);
    }
}

/// Marks every leaf in `subtree`, recursing down to each one.
pub fn mark_subtree<T: Copy + Eq>(
    nodes: &mut Pool<Node<T>>,
    pairs: &mut Pool<Pair<T>>,
    partner: Option<&Partner<'_, T>>,
    subtree: NodeIndex,
    stamp: u64,
    emit: &mut impl FnMut(T, T),
) {
    if nodes.get(subtree.0).is_leaf() {
        mark_leaf(nodes, pairs, partner, subtree, stamp, emit);
    } else {
        let (a, b) = nodes.get(subtree.0).children();
        mark_subtree(nodes, pairs, partner, a, stamp, emit);
        mark_subtree(nodes, pairs, partner, b, stamp, emit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broad::subtree;
    use crate::types::bb::Bb2;

    fn leaf_node<T>(obj: T, bb: Bb2) -> Node<T> {
        Node { bb, parent: None, kind: NodeKind::Leaf { obj, stamp: 0, pairs: None } }
    }

    #[test]
    fn touched_leaf_pairs_with_overlapping_sibling_and_emits_once() {
        let mut nodes: Pool<Node<u32>> = Pool::new();
        let mut pairs: Pool<Pair<u32>> = Pool::new();

        let a = NodeIndex(nodes.obtain(leaf_node(1, Bb2::new(0.0, 0.0, 2.0, 2.0))));
        let b = NodeIndex(nodes.obtain(leaf_node(2, Bb2::new(1.0, 1.0, 3.0, 3.0))));
        let _root = subtree::insert(&mut nodes, None, a);
        let _root = subtree::insert(&mut nodes, Some(_root), b);

        if let NodeKind::Leaf { stamp, .. } = &mut nodes.get_mut(a.0).kind {
            *stamp = 1;
        }

        let mut emitted = Vec::new();
        mark_leaf(&mut nodes, &mut pairs, None, a, 1, &mut |x, y| emitted.push((x, y)));

        assert_eq!(emitted, vec![(1, 2)]);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn untouched_leaf_replays_without_retesting_bounds() {
        let mut nodes: Pool<Node<u32>> = Pool::new();
        let mut pairs: Pool<Pair<u32>> = Pool::new();

        let a = NodeIndex(nodes.obtain(leaf_node(1, Bb2::new(0.0, 0.0, 2.0, 2.0))));
        let b = NodeIndex(nodes.obtain(leaf_node(2, Bb2::new(1.0, 1.0, 3.0, 3.0))));
        let index = crate::broad::pair::pair_insert(
            &mut pairs,
            &mut nodes,
            LeafRef::Owned(a),
            LeafRef::Owned(b),
        );
        assert_eq!(index.0, 0);

        let mut emitted = Vec::new();
        mark_leaf(&mut nodes, &mut pairs, None, b, 5, &mut |x, y| emitted.push((x, y)));
        assert_eq!(emitted, vec![(1, 2)]);
    }

    #[test]
    fn two_leaves_touched_in_the_same_pass_emit_exactly_one_pair() {
        // This is the scenario the `left` flag and stamp guard exist for:
        // both endpoints of an overlapping pair moved this stamp, so each
        // leaf's own walk-up reaches the other. Without the guard this
        // would double-insert the pair and double-emit the callback.
        let mut nodes: Pool<Node<u32>> = Pool::new();
        let mut pairs: Pool<Pair<u32>> = Pool::new();

        let a = NodeIndex(nodes.obtain(leaf_node(1, Bb2::new(0.0, 0.0, 2.0, 2.0))));
        let b = NodeIndex(nodes.obtain(leaf_node(2, Bb2::new(1.0, 1.0, 3.0, 3.0))));
        let root = subtree::insert(&mut nodes, None, a);
        let root = subtree::insert(&mut nodes, Some(root), b);

        for index in [a, b] {
            if let NodeKind::Leaf { stamp, .. } = &mut nodes.get_mut(index.0).kind {
                *stamp = 7;
            }
        }

        let mut emitted = Vec::new();
        mark_subtree(&mut nodes, &mut pairs, None, root, 7, &mut |x, y| {
            emitted.push((x.min(y), x.max(y)));
        });

        assert_eq!(emitted, vec![(1, 2)], "pair must be emitted exactly once, not twice");
        assert_eq!(pairs.len(), 1, "exactly one Pair record, not a duplicate");
    }
}
