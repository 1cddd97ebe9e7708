#![deny(
    warnings,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    rust_2018_idioms,
    missing_docs,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![doc = r"Geometry for Echo's broad-phase collision system.

This crate provides:
- A 2D axis-aligned bounding box (`Bb2`) with the merge/area/contains/
  intersect operations the broad-phase needs.
- `DynamicTree`, a self-balancing AABB tree that tracks potentially-
  colliding object pairs across frames using velocity-extended bounds,
  pooled nodes, and a cross-linked pair cache.
- A thin `BroadPhase` adapter for callers that only want a snapshot query
  surface instead of the full incremental API.

Design notes:
- Deterministic data structure: given the same sequence of operations, the
  tree shape and emitted pairs are identical. Callback *emission order*
  within a single `reindex_query` follows the mark-pass recursion order,
  not a globally canonical sort — see `broad::mark`.
- Float32 throughout; operations favor clarity and reproducibility.
- Rustdoc is treated as part of the contract; public items are documented.
"]

/// Foundational geometric types (currently just the 2D bounding box).
pub mod types;
/// The dynamic AABB-tree broad-phase: pool, hash index, nodes, pairs, mark
/// engine, and the public `DynamicTree` façade.
pub mod broad;

pub use broad::aabb_tree::{BroadPhase, TreeAdapter};
pub use broad::tree::{DynamicTree, Partner, SpatialIndex};
pub use types::bb::Bb2;
