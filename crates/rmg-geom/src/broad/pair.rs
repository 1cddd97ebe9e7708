//! Cached collision pairs and the doubly-linked "thread" lists that let a
//! leaf's cached pairs be walked, unlinked, and replayed cheaply.
//!
//! A pair can link two leaves that live in the *same* tree, or a leaf in
//! this tree to one living in a static partner tree (see
//! [`crate::broad::tree::Partner`]). Every [`Pair`] is always allocated out
//! of the pool belonging to the tree that is currently being marked — for
//! dynamic/static pairs that is always the dynamic side, since the static
//! side never moves and never replays its cache. A [`LeafRef::External`]
//! therefore never needs its own thread list: nothing ever walks a pair
//! list starting from the static leaf, only from the dynamic one.
//!
//! One consequence worth recording plainly: removing an object from a tree
//! that is currently used as someone else's static partner does not reach
//! across pools to invalidate pairs cached against it. Those entries are
//! cleaned up lazily the next time the owning dynamic leaf's stamp mismatch
//! causes a fresh mark pass to replace them. Embedders that remove
//! long-lived static geometry while a dynamic tree actively pairs against
//! it should expect one stale frame at worst.

use crate::broad::node::{Node, NodeIndex, NodeKind, PairIndex};
use crate::broad::pool::Pool;

/// Identifies one side of a cached pair: either a leaf owned by this tree
/// (addressable by index, and thus linkable into a list), or a handle for
/// a leaf living in a static partner tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LeafRef<T> {
    /// A leaf node living in this tree's own pool.
    Owned(NodeIndex),
    /// An embedder handle for a leaf living in a static partner's pool.
    External(T),
}

/// One side of a [`Pair`]: which leaf it names, and its position in that
/// leaf's cached-pair linked list.
#[derive(Debug, Copy, Clone)]
pub struct Thread<T> {
    /// Previous pair in this leaf's list, or `None` if this is the head.
    pub prev: Option<PairIndex>,
    /// The leaf this thread entry belongs to.
    pub leaf: LeafRef<T>,
    /// Next pair in this leaf's list, or `None` if this is the tail.
    pub next: Option<PairIndex>,
}

/// A cached overlap between two leaves, found by a previous mark pass and
/// replayed on later passes until one side's bounding box invalidates it.
#[derive(Debug, Copy, Clone)]
pub struct Pair<T> {
    /// First side.
    pub a: Thread<T>,
    /// Second side.
    pub b: Thread<T>,
}

fn pairs_head<T: Copy + Eq>(nodes: &Pool<Node<T>>, leaf: LeafRef<T>) -> Option<PairIndex> {
    match leaf {
        LeafRef::Owned(index) => match &nodes.get(index.0).kind {
            NodeKind::Leaf { pairs, .. } => *pairs,
            NodeKind::Branch { .. } => unreachable!("leaf ref pointed at a branch node"),
        },
        LeafRef::External(_) => None,
    }
}

fn set_pairs_head<T: Copy + Eq>(
    nodes: &mut Pool<Node<T>>,
    leaf: LeafRef<T>,
    head: Option<PairIndex>,
) {
    if let LeafRef::Owned(index) = leaf {
        match &mut nodes.get_mut(index.0).kind {
            NodeKind::Leaf { pairs, .. } => *pairs = head,
            NodeKind::Branch { .. } => unreachable!("leaf ref pointed at a branch node"),
        }
    }
}

/// Inserts a new cached pair between `a` and `b`, threading it onto the
/// head of each owned side's linked list.
pub fn pair_insert<T: Copy + Eq>(
    pairs: &mut Pool<Pair<T>>,
    nodes: &mut Pool<Node<T>>,
    a: LeafRef<T>,
    b: LeafRef<T>,
) -> PairIndex {
    let a_head = pairs_head(nodes, a);
    let b_head = pairs_head(nodes, b);

    let index = PairIndex(pairs.obtain(Pair {
        a: Thread { prev: None, leaf: a, next: a_head },
        b: Thread { prev: None, leaf: b, next: b_head },
    }));

    if let Some(head) = a_head {
        set_prev_for(pairs, head, a, Some(index));
    }
    if let Some(head) = b_head {
        set_prev_for(pairs, head, b, Some(index));
    }

    set_pairs_head(nodes, a, Some(index));
    set_pairs_head(nodes, b, Some(index));

    index
}

fn set_prev_for<T: Copy + Eq>(
    pairs: &mut Pool<Pair<T>>,
    at: PairIndex,
    leaf: LeafRef<T>,
    prev: Option<PairIndex>,
) {
    let pair = pairs.get_mut(at.0);
    if pair.a.leaf == leaf {
        pair.a.prev = prev;
    } else {
        debug_assert!(pair.b.leaf == leaf, "pair at thread head does not reference leaf");
        pair.b.prev = prev;
    }
}

fn set_next_for<T: Copy + Eq>(
    pairs: &mut Pool<Pair<T>>,
    at: PairIndex,
    leaf: LeafRef<T>,
    next: Option<PairIndex>,
) {
    let pair = pairs.get_mut(at.0);
    if pair.a.leaf == leaf {
        pair.a.next = next;
    } else {
        debug_assert!(pair.b.leaf == leaf, "pair at thread tail does not reference leaf");
        pair.b.next = next;
    }
}

/// Removes `thread` from whatever list it is currently threaded into,
/// patching its neighbors (or the owning leaf's head, if `thread` was the
/// head) to close the gap.
///
/// `thread` names a *position*, already read out of the pair being
/// unlinked; the pair itself is not touched here (callers recycle it
/// separately once both its threads have been unlinked or discarded).
pub fn thread_unlink<T: Copy + Eq>(
    pairs: &mut Pool<Pair<T>>,
    nodes: &mut Pool<Node<T>>,
    thread: Thread<T>,
) {
    if let Some(next) = thread.next {
        set_prev_for(pairs, next, thread.leaf, thread.prev);
    }
    if let Some(prev) = thread.prev {
        set_next_for(pairs, prev, thread.leaf, thread.next);
    } else {
        set_pairs_head(nodes, thread.leaf, thread.next);
    }
}

/// Removes and recycles every pair cached against `leaf`, unlinking each
/// pair's *other* side as it goes. `head` is the leaf's current list head
/// (its node's `pairs` field, read by the caller before the leaf node
/// itself may be recycled).
pub fn pairs_clear<T: Copy + Eq>(
    pairs: &mut Pool<Pair<T>>,
    nodes: &mut Pool<Node<T>>,
    leaf: LeafRef<T>,
    head: Option<PairIndex>,
) {
    let mut cursor = head;
    while let Some(index) = cursor {
        let pair = *pairs.get(index.0);
        let (this_side, other_side) =
            if pair.a.leaf == leaf { (pair.a, pair.b) } else { (pair.b, pair.a) };
        cursor = this_side.next;
        thread_unlink(pairs, nodes, other_side);
        pairs.recycle(index.0);
    }
    set_pairs_head(nodes, leaf, None);
}
