//! Axis-aligned bounding box in 2D world coordinates.

/// Axis-aligned bounding box described by its four edges.
///
/// Invariants:
/// - `l <= r` (left edge does not exceed the right edge).
/// - `b <= t` (bottom edge does not exceed the top edge).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bb2 {
    l: f32,
    b: f32,
    r: f32,
    t: f32,
}

impl Bb2 {
    /// Constructs a box from its four edges.
    ///
    /// # Panics
    /// Panics if `l > r` or `b > t`.
    #[must_use]
    pub fn new(l: f32, b: f32, r: f32, t: f32) -> Self {
        assert!(l <= r && b <= t, "invalid Bb2: l={l} r={r} b={b} t={t}");
        Self { l, b, r, t }
    }

    /// Degenerate box containing exactly one point.
    #[must_use]
    pub fn point(x: f32, y: f32) -> Self {
        Self { l: x, b: y, r: x, t: y }
    }

    /// Left edge.
    #[must_use]
    pub const fn l(&self) -> f32 {
        self.l
    }

    /// Bottom edge.
    #[must_use]
    pub const fn b(&self) -> f32 {
        self.b
    }

    /// Right edge.
    #[must_use]
    pub const fn r(&self) -> f32 {
        self.r
    }

    /// Top edge.
    #[must_use]
    pub const fn t(&self) -> f32 {
        self.t
    }

    /// Surface area proxy used by the insertion heuristic (width * height;
    /// may be zero or negative-free since `l <= r` and `b <= t` always hold).
    #[must_use]
    pub fn area(&self) -> f32 {
        (self.r - self.l) * (self.t - self.b)
    }

    /// Union of two boxes: the smallest box containing both.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            l: self.l.min(other.l),
            b: self.b.min(other.b),
            r: self.r.max(other.r),
            t: self.t.max(other.t),
        }
    }

    /// Area of `self.merge(other)`, without constructing the merged box.
    #[must_use]
    pub fn merged_area(&self, other: &Self) -> f32 {
        (self.r.max(other.r) - self.l.min(other.l)) * (self.t.max(other.t) - self.b.min(other.b))
    }

    /// Returns `true` if `self` fully contains `other` (inclusive on edges).
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.l <= other.l && self.r >= other.r && self.b <= other.b && self.t >= other.t
    }

    /// Returns `true` if the two boxes overlap, inclusive of touching edges.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.l <= other.r && other.l <= self.r && self.b <= other.t && other.b <= self.t
    }

    /// Returns `true` if the segment `a -> b` intersects this box.
    ///
    /// Standard slab test: clip the segment's parametric range `[0, 1]`
    /// against each axis' pair of planes and check the ranges still
    /// overlap. Does not report *where* along the segment the hit occurs —
    /// callers that need an exit parameter for early-exit pruning must
    /// compute it themselves (see `broad::subtree::segment_query`).
    #[must_use]
    pub fn intersects_segment(&self, a: (f32, f32), b: (f32, f32)) -> bool {
        let delta = (b.0 - a.0, b.1 - a.1);
        let (mut t_min, mut t_max) = (0.0f32, 1.0f32);

        for ((min_edge, max_edge), (origin, dir)) in
            [(self.l, self.r), (self.b, self.t)].into_iter().zip([(a.0, delta.0), (a.1, delta.1)])
        {
            if dir.abs() < f32::EPSILON {
                if origin < min_edge || origin > max_edge {
                    return false;
                }
                continue;
            }

            let inv = 1.0 / dir;
            let mut t0 = (min_edge - origin) * inv;
            let mut t1 = (max_edge - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return false;
            }
        }

        true
    }
}

/// Fraction of a box's tight extent added as margin on each expanding side,
/// and the fraction of velocity folded into the expansion. Matches the
/// `coef = 0.1` constant from the reference broad-phase.
const VELOCITY_COEF: f32 = 0.1;

/// Inflates a tight box by a fraction of its own size plus a scaled velocity
/// estimate, producing the cached "expanded" box a leaf keeps between
/// reindex passes so small motions don't force a tree reinsertion.
///
/// With no velocity (`velocity == None`) the expanded box equals `tight`.
#[must_use]
pub fn expand_for_velocity(tight: &Bb2, velocity: Option<(f32, f32)>) -> Bb2 {
    let Some((vx, vy)) = velocity else {
        return *tight;
    };

    let x = (tight.r - tight.l) * VELOCITY_COEF;
    let y = (tight.t - tight.b) * VELOCITY_COEF;
    let (vx, vy) = (vx * VELOCITY_COEF, vy * VELOCITY_COEF);

    Bb2::new(
        tight.l + (-x).min(vx),
        tight.b + (-y).min(vy),
        tight.r + x.max(vx),
        tight.t + y.max(vy),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_the_smallest_enclosing_box() {
        let a = Bb2::new(0.0, 0.0, 2.0, 2.0);
        let b = Bb2::new(1.0, -1.0, 3.0, 1.0);
        let m = a.merge(&b);
        assert_eq!((m.l(), m.b(), m.r(), m.t()), (0.0, -1.0, 3.0, 2.0));
        assert!((m.area() - a.merged_area(&b)).abs() < 1e-6);
    }

    #[test]
    fn touching_edges_count_as_intersecting() {
        let a = Bb2::new(0.0, 0.0, 1.0, 1.0);
        let b = Bb2::new(1.0, 0.0, 2.0, 1.0);
        assert!(a.intersects(&b));
    }

    #[test]
    fn separated_boxes_do_not_intersect() {
        let a = Bb2::new(0.0, 0.0, 1.0, 1.0);
        let b = Bb2::new(2.0, 2.0, 3.0, 3.0);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn contains_is_inclusive_of_equal_edges() {
        let a = Bb2::new(0.0, 0.0, 4.0, 4.0);
        let b = Bb2::new(0.0, 0.0, 4.0, 4.0);
        assert!(a.contains(&b));
    }

    #[test]
    fn no_velocity_leaves_box_unchanged() {
        let tight = Bb2::new(0.0, 0.0, 10.0, 10.0);
        let expanded = expand_for_velocity(&tight, None);
        assert_eq!(expanded, tight);
    }

    #[test]
    fn velocity_expands_asymmetrically_in_its_direction() {
        let tight = Bb2::new(0.0, 0.0, 10.0, 10.0);
        let expanded = expand_for_velocity(&tight, Some((10.0, 0.0)));
        // margin on the static axes is coef * extent = 1.0; velocity along x
        // is coef * 10 = 1.0, tying with the margin, so r grows by max(1,1)=1
        // and l shrinks by min(-1,1)= -1 (no extra shrink).
        assert_eq!(expanded.l(), -1.0);
        assert_eq!(expanded.r(), 11.0);
    }

    #[test]
    fn segment_through_box_intersects() {
        let bb = Bb2::new(0.0, 0.0, 10.0, 10.0);
        assert!(bb.intersects_segment((-5.0, 5.0), (15.0, 5.0)));
    }

    #[test]
    fn segment_missing_box_does_not_intersect() {
        let bb = Bb2::new(0.0, 0.0, 10.0, 10.0);
        assert!(!bb.intersects_segment((-5.0, 20.0), (15.0, 20.0)));
    }

    #[test]
    fn vertical_segment_handles_zero_dx() {
        let bb = Bb2::new(0.0, 0.0, 10.0, 10.0);
        assert!(bb.intersects_segment((5.0, -5.0), (5.0, 15.0)));
        assert!(!bb.intersects_segment((20.0, -5.0), (20.0, 15.0)));
    }
}
