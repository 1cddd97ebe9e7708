//! Node and pair-list index types shared across the broad-phase modules.

use crate::types::bb::Bb2;

/// Index of a node within a [`crate::broad::pool::Pool`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeIndex(pub u32);

/// Index of a cached pair within a [`crate::broad::pool::Pool`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PairIndex(pub u32);

/// A node in the tree: either an internal branch with two children, or a
/// leaf wrapping one embedder object.
#[derive(Debug)]
pub enum NodeKind<T> {
    /// Internal node. `a`/`b` are the two children; their union is `bb`.
    Branch {
        /// First child.
        a: NodeIndex,
        /// Second child.
        b: NodeIndex,
    },
    /// Leaf node wrapping a single object.
    Leaf {
        /// The embedder's handle for the wrapped object.
        obj: T,
        /// Reindex stamp this leaf's `bb` was last refreshed at.
        stamp: u64,
        /// Head of this leaf's cached-pair linked list, if any pairs are
        /// currently recorded against it.
        pairs: Option<PairIndex>,
    },
}

/// A node in the dynamic tree: its current (possibly velocity-expanded)
/// bounding box, its kind, and a back-link to its parent (absent at the
/// root).
#[derive(Debug)]
pub struct Node<T> {
    /// Current bounding box. For leaves this is the velocity-expanded "fat"
    /// box; for branches it is the union of both children's boxes.
    pub bb: Bb2,
    /// Parent node, or `None` at the root.
    pub parent: Option<NodeIndex>,
    /// What kind of node this is.
    pub kind: NodeKind<T>,
}

impl<T> Node<T> {
    /// Returns `true` if this is a leaf node.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// For a branch node, returns the sibling of `child`.
    ///
    /// # Panics
    /// Panics if called on a leaf, or if `child` is neither of this node's
    /// children.
    #[must_use]
    pub fn other_child(&self, child: NodeIndex) -> NodeIndex {
        match self.kind {
            NodeKind::Branch { a, b } => {
                if a == child {
                    b
                } else {
                    debug_assert_eq!(b, child, "other_child called with a non-child index");
                    a
                }
            }
            NodeKind::Leaf { .. } => unreachable!("other_child called on a leaf node"),
        }
    }

    /// For a branch node, returns its two children.
    ///
    /// # Panics
    /// Panics if called on a leaf.
    #[must_use]
    pub const fn children(&self) -> (NodeIndex, NodeIndex) {
        match self.kind {
            NodeKind::Branch { a, b } => (a, b),
            NodeKind::Leaf { .. } => unreachable!("children called on a leaf node"),
        }
    }
}
