//! `DynamicTree`: the public broad-phase façade tying together the node
//! pool, the pair cache, and the mark engine.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use rustc_hash::FxHashMap;
#[cfg(feature = "telemetry")]
use tracing::{debug, warn};

use crate::broad::mark::{self, mark_subtree};
use crate::broad::node::{Node, NodeIndex, NodeKind};
use crate::broad::pair::{self, LeafRef, Pair};
use crate::broad::pool::Pool;
use crate::broad::subtree;
use crate::types::bb::{expand_for_velocity, Bb2};

/// Computes an object's tight (un-expanded) bounding box.
pub type BbFn<T> = fn(&T) -> Bb2;
/// Computes an object's current velocity estimate, if it has one. Objects
/// that return `None` (or trees built with `DynamicTree::new`, which never
/// calls this at all) get no margin beyond the standard extent-based one.
pub type VelocityFn<T> = fn(&T) -> Option<(f32, f32)>;

/// Borrow of another tree used as a fixed, read-only collision partner
/// during [`DynamicTree::insert`], [`DynamicTree::reindex_object`], and
/// [`DynamicTree::reindex_query`]. Constructed internally from whatever
/// [`DynamicTree::set_static_partner`] attached; not something callers of
/// those methods build directly.
///
/// Both variants expose the same read-only view; `Dynamic` exists for code
/// that calls into [`crate::broad::mark`] directly with a caller-held
/// `&mut DynamicTree` elsewhere, so it doesn't have to manufacture a
/// second, separately-scoped shared borrow just to pass it as a partner.
pub enum Partner<'a, T> {
    /// A partner tree this call will not reindex, only read.
    Static(&'a DynamicTree<T>),
    /// A partner tree reached through a mutable borrow the caller retains
    /// for other purposes; still only read from during the call.
    Dynamic(&'a mut DynamicTree<T>),
}

impl<'a, T> Partner<'a, T> {
    pub(crate) fn nodes(&self) -> &Pool<Node<T>> {
        match self {
            Self::Static(tree) => &tree.nodes,
            Self::Dynamic(tree) => &tree.nodes,
        }
    }

    pub(crate) fn root(&self) -> Option<NodeIndex> {
        match self {
            Self::Static(tree) => tree.root,
            Self::Dynamic(tree) => tree.root,
        }
    }
}

/// Query surface an embedder can depend on without the full incremental
/// API. Implemented by [`DynamicTree`]; mirrored in spirit by
/// [`crate::broad::aabb_tree::TreeAdapter`] for snapshot-style callers.
pub trait SpatialIndex<T> {
    /// Inserts `obj`, computing its initial box (and, if configured, its
    /// initial velocity margin) immediately.
    fn insert(&mut self, obj: T);
    /// Removes `obj`. Returns `false` if it was not present.
    fn remove(&mut self, obj: &T) -> bool;
    /// Returns `true` if `obj` is currently indexed.
    fn contains(&self, obj: &T) -> bool;
    /// Number of indexed objects.
    fn count(&self) -> usize;
    /// Visits every indexed object whose box contains `point`.
    fn point_query(&self, point: (f32, f32), visit: &mut dyn FnMut(T));
    /// Visits every indexed object whose box intersects `bb`.
    fn query(&self, bb: &Bb2, visit: &mut dyn FnMut(T));
    /// Visits every indexed object whose box intersects the segment.
    fn segment_query(&self, a: (f32, f32), b: (f32, f32), visit: &mut dyn FnMut(T));
    /// Visits every indexed object, in implementation-defined order.
    fn each(&self, visit: &mut dyn FnMut(T));
}

fn leaf_obj<T: Copy>(nodes: &Pool<Node<T>>, index: NodeIndex) -> T {
    match nodes.get(index.0).kind {
        NodeKind::Leaf { obj, .. } => obj,
        NodeKind::Branch { .. } => unreachable!("leaf_obj called on a branch"),
    }
}

#[cfg(feature = "telemetry")]
fn tree_depth<T>(nodes: &Pool<Node<T>>, index: NodeIndex) -> usize {
    match nodes.get(index.0).kind {
        NodeKind::Leaf { .. } => 1,
        NodeKind::Branch { a, b } => 1 + tree_depth(nodes, a).max(tree_depth(nodes, b)),
    }
}

/// A dynamic, velocity-expanded AABB tree broad-phase.
///
/// `T` is the embedder's lightweight handle for an indexed object (a slot
/// index, entity id, or similar `Copy` key) — the tree never stores
/// geometry itself, only `T` plus the boxes `bb_fn`/`velocity_fn` derive
/// from it on demand.
pub struct DynamicTree<T> {
    nodes: Pool<Node<T>>,
    pairs: Pool<Pair<T>>,
    root: Option<NodeIndex>,
    index: FxHashMap<T, NodeIndex>,
    stamp: u64,
    bb_fn: BbFn<T>,
    velocity_fn: Option<VelocityFn<T>>,
    /// Fixed, read-only collision partner shared via `Rc<RefCell<_>>` so it
    /// can be stored on the tree itself (per spec.md §6's "construction
    /// takes the static-partner index") rather than re-supplied on every
    /// `reindex_query` call — `insert`/`reindex_object` need it too, to
    /// cache a leaf's static pairs the moment it is placed rather than only
    /// on whichever later frame it happens to move.
    static_partner: Option<Rc<RefCell<Self>>>,
}

impl<T: Copy + Eq + Hash> DynamicTree<T> {
    /// Creates an empty tree with no velocity expansion beyond the
    /// standard extent-based margin.
    #[must_use]
    pub fn new(bb_fn: BbFn<T>) -> Self {
        Self {
            nodes: Pool::new(),
            pairs: Pool::new(),
            root: None,
            index: FxHashMap::default(),
            stamp: 0,
            bb_fn,
            velocity_fn: None,
            static_partner: None,
        }
    }

    /// Creates an empty tree that additionally expands each leaf's box by
    /// a fraction of its estimated velocity, so fast-moving objects need
    /// fewer tree updates per unit of travel.
    #[must_use]
    pub fn with_velocity(bb_fn: BbFn<T>, velocity_fn: VelocityFn<T>) -> Self {
        Self { velocity_fn: Some(velocity_fn), ..Self::new(bb_fn) }
    }

    /// Attaches (or replaces) the velocity estimator used by
    /// [`Self::expanded_bb`] after construction. Takes effect the next time
    /// a leaf is inserted or repositioned; does not retroactively re-expand
    /// boxes already cached on existing leaves.
    pub fn set_velocity_fn(&mut self, velocity_fn: VelocityFn<T>) {
        self.velocity_fn = Some(velocity_fn);
    }

    /// Attaches (or replaces) the fixed, read-only static partner tree
    /// queried for cross-tree pairs by `insert`, `reindex_object`, and
    /// `reindex_query`. The partner is never mutated through this
    /// relationship — only borrowed — matching spec.md §6's "static
    /// partner" contract. Shared via `Rc<RefCell<_>>` so the same partner
    /// tree can be built once and attached to any number of dynamic trees.
    pub fn set_static_partner(&mut self, partner: Rc<RefCell<Self>>) {
        self.static_partner = Some(partner);
    }

    fn expanded_bb(&self, obj: &T) -> Bb2 {
        let tight = (self.bb_fn)(obj);
        let velocity = self.velocity_fn.and_then(|f| f(obj));
        expand_for_velocity(&tight, velocity)
    }

    /// Repositions the leaf at `index` if its tight box has escaped its
    /// cached expanded box, clearing and re-threading its pair cache.
    /// Returns `true` if it moved. Does not itself discover new pairs —
    /// callers refresh the cache afterward (immediately for the standalone
    /// `reindex_object`/`reindex` entry points, or via the unified mark
    /// pass for `reindex_query`).
    fn reposition(&mut self, index: NodeIndex) -> bool {
        let obj = leaf_obj(&self.nodes, index);
        let tight = (self.bb_fn)(&obj);
        if self.nodes.get(index.0).bb.contains(&tight) {
            return false;
        }

        let head = match self.nodes.get(index.0).kind {
            NodeKind::Leaf { pairs, .. } => pairs,
            NodeKind::Branch { .. } => unreachable!("reposition called on a branch"),
        };
        pair::pairs_clear(&mut self.pairs, &mut self.nodes, LeafRef::Owned(index), head);

        let root_without = self.root.and_then(|root| subtree::remove(&mut self.nodes, root, index));
        let expanded = self.expanded_bb(&obj);
        self.nodes.get_mut(index.0).bb = expanded;
        if let NodeKind::Leaf { stamp, .. } = &mut self.nodes.get_mut(index.0).kind {
            *stamp = self.stamp;
        }
        self.root = Some(subtree::insert(&mut self.nodes, root_without, index));

        #[cfg(feature = "telemetry")]
        if self.nodes.len() > 1 << 20 {
            warn!(nodes = self.nodes.len(), "dynamic tree node pool unusually large");
        }

        true
    }

    /// Finds `index`'s current overlaps — against this tree's own contents
    /// and, if one is attached, [`Self::static_partner`] — and threads them
    /// into its pair cache, without emitting anything. `index` must already
    /// be stamped with `self.stamp` (freshly inserted or just repositioned)
    /// so [`mark::mark_leaf`] takes its touched path. This is what makes a
    /// brand-new or just-moved leaf's static-partner pairs available from
    /// its very next cache replay, rather than only on whichever later
    /// frame a [`Self::reindex_query`] call happens to also query a
    /// partner — `cpBBTreeInsert` does the same `LeafAddPairs` call against
    /// `staticIndex` before ever reaching a `ReindexQuery`.
    fn refresh_pairs_silently(&mut self, index: NodeIndex) {
        // Clone the `Rc` (a refcount bump) before borrowing it, so the
        // resulting `Ref`'s lifetime is tied to this local clone instead of
        // to `self` — that's what lets `&mut self.nodes`/`&mut self.pairs`
        // be borrowed at the same time below.
        match self.static_partner.clone() {
            Some(partner_rc) => {
                let partner_tree = partner_rc.borrow();
                let partner = Partner::Static(&partner_tree);
                mark::mark_leaf(
                    &mut self.nodes,
                    &mut self.pairs,
                    Some(&partner),
                    index,
                    self.stamp,
                    &mut |_, _| {},
                );
            }
            None => {
                mark::mark_leaf(&mut self.nodes, &mut self.pairs, None, index, self.stamp, &mut |_, _| {});
            }
        }
    }

    /// Repositions `obj` if it moved, immediately refreshing its cached
    /// pairs against this tree's own contents and its static partner, if
    /// any. Bumps the stamp once, unconditionally, whether or not `obj`
    /// actually moved. Returns `false` if `obj` is not indexed.
    pub fn reindex_object(&mut self, obj: &T) -> bool {
        let Some(&index) = self.index.get(obj) else { return false };
        if self.reposition(index) {
            self.refresh_pairs_silently(index);
        }
        self.stamp += 1;
        true
    }

    /// Repositions and refreshes every indexed object, without emitting any
    /// pairs. Equivalent to [`Self::reindex_query`] with a no-op callback.
    pub fn reindex(&mut self) {
        self.reindex_query(|_, _| {});
    }

    /// Repositions every object that moved since the last call, then walks
    /// the whole tree emitting every currently overlapping pair — freshly
    /// discovered ones and cache replays alike — exactly once each.
    ///
    /// If a static partner is attached (see [`Self::set_static_partner`]),
    /// it is also queried (read-only, never mutated) for cross-tree pairs
    /// against objects that moved this call.
    pub fn reindex_query(&mut self, mut emit: impl FnMut(T, T)) {
        self.stamp += 1;

        let indices: Vec<NodeIndex> = self.index.values().copied().collect();
        for index in indices {
            self.reposition(index);
        }

        if let Some(root) = self.root {
            match self.static_partner.clone() {
                Some(partner_rc) => {
                    let partner_tree = partner_rc.borrow();
                    let partner = Partner::Static(&partner_tree);
                    mark_subtree(&mut self.nodes, &mut self.pairs, Some(&partner), root, self.stamp, &mut emit);
                }
                None => {
                    mark_subtree(&mut self.nodes, &mut self.pairs, None, root, self.stamp, &mut emit);
                }
            }
        }
    }

    /// Rebuilds the tree from scratch as a balanced binary partition over
    /// every currently indexed object's box. Pair caches are untouched:
    /// structure changes, but nothing the mark pass would consider "moved".
    pub fn optimize(&mut self) {
        if self.index.len() < 2 {
            return;
        }
        let mut leaves: Vec<NodeIndex> = self.index.values().copied().collect();
        let root = subtree::rebuild_balanced(&mut self.nodes, &mut leaves);
        self.nodes.get_mut(root.0).parent = None;
        self.root = Some(root);

        #[cfg(feature = "telemetry")]
        debug!(leaves = self.index.len(), depth = tree_depth(&self.nodes, root), "tree optimized");
    }

    /// Visits every pair currently held in the cache exactly once, without
    /// repositioning anything or consulting `bb_fn`.
    ///
    /// This is the right way to read back pairs for a tree whose leaves are
    /// placed via [`Self::insert_with_bb`]/[`Self::update_bb`] rather than
    /// `bb_fn`: those entry points already reposition and refresh the cache
    /// synchronously on every call, so there is nothing left for a mark
    /// pass to discover. Calling [`Self::reindex_query`] on such a tree
    /// instead would re-derive every leaf's tight box from `bb_fn` — wrong
    /// whenever `bb_fn` doesn't track the same position the explicit calls
    /// do, which is the usual case for an explicit-box caller.
    pub fn cached_pairs(&self, mut emit: impl FnMut(T, T)) {
        fn walk<T: Copy + Eq>(
            nodes: &Pool<Node<T>>,
            pairs: &Pool<Pair<T>>,
            index: NodeIndex,
            emit: &mut impl FnMut(T, T),
        ) {
            match &nodes.get(index.0).kind {
                NodeKind::Leaf { pairs: head, .. } => {
                    mark::replay_cached_pairs(pairs, nodes, index, *head, emit);
                }
                NodeKind::Branch { a, b } => {
                    walk(nodes, pairs, *a, emit);
                    walk(nodes, pairs, *b, emit);
                }
            }
        }

        if let Some(root) = self.root {
            walk(&self.nodes, &self.pairs, root, &mut emit);
        }
    }

    /// Inserts `obj` with an explicitly supplied box, bypassing `bb_fn`
    /// entirely. For embedders that already have the current box in hand
    /// and would rather pass it than indirect through a stored callback.
    /// Prefer [`Self::cached_pairs`] over `reindex_query`/`reindex`/
    /// `reindex_object` to read back this tree's pairs — those entry
    /// points re-derive every leaf's box from `bb_fn`, which for a tree
    /// whose leaves are placed this way is usually a stale or unrelated
    /// value.
    pub fn insert_with_bb(&mut self, obj: T, bb: Bb2) {
        debug_assert!(!self.index.contains_key(&obj), "object already indexed");
        let index = NodeIndex(self.nodes.obtain(Node {
            bb,
            parent: None,
            kind: NodeKind::Leaf { obj, stamp: self.stamp, pairs: None },
        }));
        self.root = Some(subtree::insert(&mut self.nodes, self.root, index));
        self.refresh_pairs_silently(index);
        self.index.insert(obj, index);
        self.stamp += 1;
    }

    /// Updates `obj`'s box directly, bypassing `bb_fn`. Repositions it in
    /// the tree and refreshes its cached pairs only if `bb` escaped the
    /// box currently cached for it. Returns `false` if `obj` is not
    /// indexed. See [`Self::cached_pairs`] for reading back pairs on a
    /// tree managed this way.
    pub fn update_bb(&mut self, obj: &T, bb: Bb2) -> bool {
        let Some(&index) = self.index.get(obj) else { return false };
        if self.nodes.get(index.0).bb.contains(&bb) {
            return true;
        }

        let head = match self.nodes.get(index.0).kind {
            NodeKind::Leaf { pairs, .. } => pairs,
            NodeKind::Branch { .. } => unreachable!("update_bb target is not a leaf"),
        };
        pair::pairs_clear(&mut self.pairs, &mut self.nodes, LeafRef::Owned(index), head);

        let root_without = self.root.and_then(|root| subtree::remove(&mut self.nodes, root, index));
        self.nodes.get_mut(index.0).bb = bb;
        if let NodeKind::Leaf { stamp, .. } = &mut self.nodes.get_mut(index.0).kind {
            *stamp = self.stamp;
        }
        self.root = Some(subtree::insert(&mut self.nodes, root_without, index));
        self.refresh_pairs_silently(index);
        self.stamp += 1;
        true
    }
}

impl<T: Copy + Eq + Hash> SpatialIndex<T> for DynamicTree<T> {
    fn insert(&mut self, obj: T) {
        debug_assert!(!self.index.contains_key(&obj), "object already indexed");
        let expanded = self.expanded_bb(&obj);
        let index = NodeIndex(self.nodes.obtain(Node {
            bb: expanded,
            parent: None,
            kind: NodeKind::Leaf { obj, stamp: self.stamp, pairs: None },
        }));
        self.root = Some(subtree::insert(&mut self.nodes, self.root, index));
        self.refresh_pairs_silently(index);
        self.index.insert(obj, index);
        self.stamp += 1;
    }

    fn remove(&mut self, obj: &T) -> bool {
        let Some(index) = self.index.remove(obj) else { return false };
        let head = match self.nodes.get(index.0).kind {
            NodeKind::Leaf { pairs, .. } => pairs,
            NodeKind::Branch { .. } => unreachable!("remove target is not a leaf"),
        };
        pair::pairs_clear(&mut self.pairs, &mut self.nodes, LeafRef::Owned(index), head);
        self.root = self.root.and_then(|root| subtree::remove(&mut self.nodes, root, index));
        self.nodes.recycle(index.0);
        self.stamp += 1;
        true
    }

    fn contains(&self, obj: &T) -> bool {
        self.index.contains_key(obj)
    }

    fn count(&self) -> usize {
        self.index.len()
    }

    fn point_query(&self, point: (f32, f32), visit: &mut dyn FnMut(T)) {
        subtree::range_query(&self.nodes, self.root, &Bb2::point(point.0, point.1), visit);
    }

    fn query(&self, bb: &Bb2, visit: &mut dyn FnMut(T)) {
        subtree::range_query(&self.nodes, self.root, bb, visit);
    }

    fn segment_query(&self, a: (f32, f32), b: (f32, f32), visit: &mut dyn FnMut(T)) {
        subtree::segment_query(&self.nodes, self.root, a, b, visit);
    }

    fn each(&self, visit: &mut dyn FnMut(T)) {
        subtree::each(&self.nodes, self.root, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bb_of(obj: &(i32, i32, i32, i32)) -> Bb2 {
        let (l, b, r, t) = *obj;
        Bb2::new(l as f32, b as f32, r as f32, t as f32)
    }

    #[test]
    fn insert_and_query_find_overlapping_boxes() {
        let mut tree: DynamicTree<(i32, i32, i32, i32)> = DynamicTree::new(bb_of);
        tree.insert((0, 0, 2, 2));
        tree.insert((5, 5, 7, 7));

        let mut found = Vec::new();
        tree.query(&Bb2::new(-1.0, -1.0, 3.0, 3.0), &mut |obj| found.push(obj));
        assert_eq!(found, vec![(0, 0, 2, 2)]);
    }

    #[test]
    fn reindex_query_emits_each_pair_exactly_once() {
        let mut tree: DynamicTree<usize> = DynamicTree::new(|_| Bb2::new(0.0, 0.0, 1.0, 1.0));
        tree.insert(1);
        tree.insert(2);
        tree.insert(3);

        let mut emitted = Vec::new();
        tree.reindex_query(|a, b| emitted.push((a.min(b), a.max(b))));
        emitted.sort_unstable();
        // Deliberately not deduped: a duplicate here would mean a pair was
        // both registered and emitted twice, not just registered twice.
        assert_eq!(emitted, vec![(1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn two_objects_touched_in_sequence_still_pair_exactly_once() {
        // Each `update_bb` stamps and refreshes its own object immediately,
        // so the second call's walk-up meets the first object at a stamp
        // it has already moved past. Regression coverage for the guard
        // that keeps that meeting from inserting the pair twice; the case
        // where both stamps are identical in one batch is covered at the
        // mark-pass level by `two_leaves_touched_in_the_same_pass_emit_exactly_one_pair`.
        //
        // Managed entirely through `insert_with_bb`/`update_bb`, so pairs
        // are read back with `cached_pairs`, not `reindex_query`.
        let mut tree: DynamicTree<usize> = DynamicTree::new(|_| Bb2::point(0.0, 0.0));
        tree.insert_with_bb(1, Bb2::new(100.0, 100.0, 101.0, 101.0));
        tree.insert_with_bb(2, Bb2::new(200.0, 200.0, 201.0, 201.0));

        assert!(tree.update_bb(&1, Bb2::new(0.0, 0.0, 2.0, 1.0)));
        assert!(tree.update_bb(&2, Bb2::new(1.0, 0.0, 3.0, 1.0)));

        let mut emitted = Vec::new();
        tree.cached_pairs(|a, b| emitted.push((a.min(b), a.max(b))));
        assert_eq!(emitted, vec![(1, 2)], "pair must be emitted exactly once");
    }

    #[test]
    fn remove_drops_the_object_from_future_queries() {
        let mut tree: DynamicTree<(i32, i32, i32, i32)> = DynamicTree::new(bb_of);
        tree.insert((0, 0, 2, 2));
        assert!(tree.remove(&(0, 0, 2, 2)));
        assert!(!tree.contains(&(0, 0, 2, 2)));
        assert_eq!(tree.count(), 0);

        let mut found = Vec::new();
        tree.each(&mut |obj| found.push(obj));
        assert!(found.is_empty());
    }

    #[test]
    fn set_velocity_fn_applies_to_leaves_inserted_after_the_call() {
        fn velocity(_: &(i32, i32, i32, i32)) -> Option<(f32, f32)> {
            Some((20.0, 0.0))
        }

        let mut tree: DynamicTree<(i32, i32, i32, i32)> = DynamicTree::new(bb_of);
        tree.set_velocity_fn(velocity);
        tree.insert((0, 0, 1, 1));
        tree.insert((3, 0, 4, 1));

        // Tight boxes at x=[0,1] and x=[3,4] don't touch, but the margin
        // from the velocity set after construction (coef * 20 = 2 on each
        // box) closes the gap.
        let mut emitted = Vec::new();
        tree.reindex_query(|a, b| emitted.push((a, b)));
        assert_eq!(emitted.len(), 1);
    }

    #[test]
    fn optimize_preserves_membership() {
        let mut tree: DynamicTree<i32> = DynamicTree::new(|&n| {
            let x = n as f32;
            Bb2::new(x, x, x + 1.0, x + 1.0)
        });
        for n in 0..20 {
            tree.insert(n);
        }
        tree.optimize();

        let mut found = Vec::new();
        tree.each(&mut |obj| found.push(obj));
        found.sort_unstable();
        assert_eq!(found, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn static_partner_pairs_are_cached_at_insert_time() {
        let mut static_tree: DynamicTree<usize> = DynamicTree::new(|_| Bb2::new(0.0, 0.0, 10.0, 10.0));
        static_tree.insert(100);
        let static_tree = Rc::new(RefCell::new(static_tree));

        let mut tree: DynamicTree<usize> = DynamicTree::new(|_| Bb2::new(5.0, 5.0, 6.0, 6.0));
        tree.set_static_partner(Rc::clone(&static_tree));

        // A stationary object must not have to wait for a reindex_query
        // that happens to also touch it: the pair is cached the moment it
        // is inserted.
        tree.insert(1);
        let mut emitted = Vec::new();
        tree.cached_pairs(|a, b| emitted.push((a.min(b), a.max(b))));
        assert_eq!(emitted, vec![(1, 100)]);
        assert_eq!(static_tree.borrow().count(), 1);
    }
}
