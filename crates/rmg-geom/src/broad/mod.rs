// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! The dynamic AABB-tree broad-phase: pooled nodes, a cross-linked pair
//! cache, and a snapshot adapter for callers that just want query/pairs.
//!
//! Determinism contract:
//! - Given the same sequence of `insert`/`remove`/`reindex_*` calls, the
//!   tree's shape and cached pairs are identical run to run.
//! - [`aabb_tree::BroadPhase::pairs`] canonicalizes each pair as
//!   `(min_id, max_id)` and returns them strictly sorted by that tuple,
//!   regardless of the mark pass's internal traversal order.
//! - Overlap is inclusive on faces (touching boxes count as overlapping).

#[doc = "Snapshot broad-phase trait and a `DynamicTree` adapter for it."]
pub mod aabb_tree;
/// The mark pass: fresh queries for touched leaves, cache replay otherwise.
pub mod mark;
/// Node and pair-list index newtypes shared across these modules.
pub mod node;
/// Cached pairs and their cross-linked "thread" lists.
pub mod pair;
/// The typed slot arena nodes and pairs are allocated from.
pub mod pool;
/// Insertion, removal, queries, and the balanced-rebuild pass.
pub mod subtree;
/// The public `DynamicTree` façade.
pub mod tree;
