//! Core geometry types used by the broad-phase.

#[doc = "2D axis-aligned bounding boxes (world space)."]
pub mod bb;
