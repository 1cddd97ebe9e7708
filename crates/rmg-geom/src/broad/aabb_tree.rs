//! A snapshot-style adapter over [`crate::broad::tree::DynamicTree`] for
//! callers that only want "upsert a box, ask for the current pair list"
//! rather than the full incremental `reindex_query`/`SpatialIndex` API.

use std::cmp::Ordering;

use crate::broad::tree::DynamicTree;
use crate::types::bb::Bb2;

/// Broad-phase interface for inserting proxies and querying overlapping
/// pairs.
///
/// Implementations must return pairs deterministically: each pair `(a, b)`
/// is canonicalized such that `a < b`, and the full list is sorted
/// ascending by `(a, b)`.
pub trait BroadPhase {
    /// Inserts or updates the proxy with the given `id` and box.
    fn upsert(&mut self, id: usize, bb: Bb2);
    /// Removes a proxy if present.
    fn remove(&mut self, id: usize);
    /// Returns a canonical, deterministically-ordered list of overlapping
    /// pairs. Discovering pairs against a dynamic tree requires
    /// repositioning anything that moved since the last call, hence `&mut
    /// self` rather than `&self`.
    fn pairs(&mut self) -> Vec<(usize, usize)>;
}

/// [`BroadPhase`] implemented on top of a [`DynamicTree<usize>`].
///
/// Boxes are supplied directly by the caller on every `upsert` rather than
/// derived from the id through a stored callback, so proxy ids here carry
/// no embedder-side lookup of their own — unlike [`DynamicTree`]'s
/// primary `bb_fn`-driven API, which this adapter deliberately bypasses
/// via `insert_with_bb`/`update_bb`.
pub struct TreeAdapter {
    tree: DynamicTree<usize>,
}

impl TreeAdapter {
    /// Creates an empty adapter.
    #[must_use]
    pub fn new() -> Self {
        // Never invoked: every mutation below goes through the explicit-box
        // entry points, which don't call `bb_fn`.
        Self { tree: DynamicTree::new(|_| Bb2::point(0.0, 0.0)) }
    }
}

impl Default for TreeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadPhase for TreeAdapter {
    fn upsert(&mut self, id: usize, bb: Bb2) {
        if self.tree.contains(&id) {
            self.tree.update_bb(&id, bb);
        } else {
            self.tree.insert_with_bb(id, bb);
        }
    }

    fn remove(&mut self, id: usize) {
        self.tree.remove(&id);
    }

    fn pairs(&mut self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        self.tree.cached_pairs(|a, b| out.push(if a < b { (a, b) } else { (b, a) }));
        out.sort_unstable_by(|x, y| match x.0.cmp(&y.0) {
            Ordering::Equal => x.1.cmp(&y.1),
            order => order,
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_pairs_is_canonical_and_sorted() {
        let mut adapter = TreeAdapter::new();
        adapter.upsert(2, Bb2::new(0.0, 0.0, 2.0, 2.0));
        adapter.upsert(1, Bb2::new(1.0, 1.0, 3.0, 3.0));
        adapter.upsert(3, Bb2::new(10.0, 10.0, 11.0, 11.0));

        assert_eq!(adapter.pairs(), vec![(1, 2)]);
    }

    #[test]
    fn remove_drops_proxy_from_future_pairs() {
        let mut adapter = TreeAdapter::new();
        adapter.upsert(1, Bb2::new(0.0, 0.0, 2.0, 2.0));
        adapter.upsert(2, Bb2::new(1.0, 1.0, 3.0, 3.0));
        adapter.remove(1);

        assert!(adapter.pairs().is_empty());
    }

    #[test]
    fn moving_a_proxy_out_of_overlap_is_reflected_next_call() {
        let mut adapter = TreeAdapter::new();
        adapter.upsert(1, Bb2::new(0.0, 0.0, 2.0, 2.0));
        adapter.upsert(2, Bb2::new(1.0, 1.0, 3.0, 3.0));
        assert_eq!(adapter.pairs(), vec![(1, 2)]);

        adapter.upsert(2, Bb2::new(100.0, 100.0, 102.0, 102.0));
        assert!(adapter.pairs().is_empty());
    }
}
