//! Collision Detection and Resolution
//!
//! Horizontal (XZ) collision helpers shared by players, crowd agents and
//! dynamic obstacles. Every function here is total: degenerate input
//! (zero-length separations, non-finite positions) yields a no-op
//! rather than NaN.

use glam::Vec3;
use serde::{Serialize, Deserialize};

use crate::core::constants::CONTACT_SLOP;

/// Below this, a separation vector is treated as zero length.
const MIN_SEPARATION: f32 = 1e-6;

// =============================================================================
// AABB
// =============================================================================

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

/// Horizontal axis of least penetration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Z,
}

impl Axis {
    /// Unit vector along this axis.
    #[inline]
    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Z => Vec3::Z,
        }
    }

    /// Component of `v` along this axis.
    #[inline]
    pub fn component(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Z => v.z,
        }
    }

    /// Mutable component of `v` along this axis.
    #[inline]
    pub fn component_mut(self, v: &mut Vec3) -> &mut f32 {
        match self {
            Axis::X => &mut v.x,
            Axis::Z => &mut v.z,
        }
    }
}

/// Overlap between two boxes on their axis of least penetration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Penetration {
    /// Axis to separate along
    pub axis: Axis,
    /// Overlap depth (positive)
    pub depth: f32,
    /// +1 or -1: direction that moves the first box away from the second
    pub sign: f32,
}

impl Aabb {
    /// Box centred on `center` with full extents `size`.
    ///
    /// Negative sizes are treated by magnitude.
    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Centre point.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Grow the footprint by `r` on X and Z; Y is unchanged.
    #[inline]
    pub fn inflate_xz(&self, r: f32) -> Self {
        let grow = Vec3::new(r, 0.0, r);
        Self {
            min: self.min - grow,
            max: self.max + grow,
        }
    }

    /// Whether the footprint contains (x, z), edges inclusive.
    #[inline]
    pub fn contains_xz(&self, x: f32, z: f32) -> bool {
        x >= self.min.x && x <= self.max.x && z >= self.min.z && z <= self.max.z
    }

    /// Whether the vertical span [bottom, top] overlaps this box by more than the slop.
    #[inline]
    pub fn overlaps_vertical(&self, bottom: f32, top: f32) -> bool {
        bottom < self.max.y - CONTACT_SLOP && top > self.min.y + CONTACT_SLOP
    }

    /// Whether the footprints overlap with positive area.
    #[inline]
    pub fn overlaps_xz(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Least-penetration separation of `self` from `other`.
    ///
    /// Returns None when the boxes do not overlap horizontally, or when
    /// their vertical extents do not overlap at all.
    pub fn penetration(&self, other: &Aabb) -> Option<Penetration> {
        if !other.overlaps_vertical(self.min.y, self.max.y) {
            return None;
        }

        let overlap_x = self.max.x.min(other.max.x) - self.min.x.max(other.min.x);
        let overlap_z = self.max.z.min(other.max.z) - self.min.z.max(other.min.z);
        // Negated comparisons also reject NaN
        if !(overlap_x > CONTACT_SLOP) || !(overlap_z > CONTACT_SLOP) {
            return None;
        }

        let axis = if overlap_x <= overlap_z { Axis::X } else { Axis::Z };
        let depth = if axis == Axis::X { overlap_x } else { overlap_z };
        let sign = if axis.component(self.center()) >= axis.component(other.center()) {
            1.0
        } else {
            -1.0
        };

        Some(Penetration { axis, depth, sign })
    }
}

// =============================================================================
// CIRCLE VS AABB
// =============================================================================

/// Horizontal displacement that moves a circle out of a box footprint.
///
/// Works on X/Z only; the returned vector has `y == 0`. Returns None when
/// the circle does not overlap the footprint. A centre inside the box is
/// pushed out through the nearest face.
pub fn resolve_circle_aabb(center: Vec3, radius: f32, aabb: &Aabb) -> Option<Vec3> {
    if !center.is_finite() || !(radius > 0.0) {
        return None;
    }

    let closest_x = center.x.max(aabb.min.x).min(aabb.max.x);
    let closest_z = center.z.max(aabb.min.z).min(aabb.max.z);
    let dx = center.x - closest_x;
    let dz = center.z - closest_z;
    let dist_sq = dx * dx + dz * dz;

    if dist_sq >= radius * radius {
        return None;
    }

    if dist_sq > MIN_SEPARATION * MIN_SEPARATION {
        let dist = dist_sq.sqrt();
        let push = radius - dist;
        return Some(Vec3::new(dx / dist * push, 0.0, dz / dist * push));
    }

    // Centre inside the footprint: leave through the nearest face
    let to_min_x = center.x - aabb.min.x;
    let to_max_x = aabb.max.x - center.x;
    let to_min_z = center.z - aabb.min.z;
    let to_max_z = aabb.max.z - center.z;

    let nearest = to_min_x.min(to_max_x).min(to_min_z).min(to_max_z);
    let displacement = if nearest == to_min_x {
        Vec3::new(-(to_min_x + radius), 0.0, 0.0)
    } else if nearest == to_max_x {
        Vec3::new(to_max_x + radius, 0.0, 0.0)
    } else if nearest == to_min_z {
        Vec3::new(0.0, 0.0, -(to_min_z + radius))
    } else {
        Vec3::new(0.0, 0.0, to_max_z + radius)
    };

    Some(displacement)
}

// =============================================================================
// CIRCLE VS CIRCLE
// =============================================================================

/// Push two circles apart on X/Z until their centres are `min_dist` apart.
///
/// `share_a` is the fraction of the overlap taken by `a` (clamped to
/// [0, 1]); `b` takes the rest. Coincident centres separate along +X.
/// Returns true if the pair was overlapping.
pub fn separate_circles(a: &mut Vec3, b: &mut Vec3, min_dist: f32, share_a: f32) -> bool {
    let delta = Vec3::new(b.x - a.x, 0.0, b.z - a.z);
    let dist = delta.length();

    if !dist.is_finite() || dist >= min_dist {
        return false;
    }

    let normal = if dist > MIN_SEPARATION {
        delta / dist
    } else {
        Vec3::X
    };
    // The slop leaves the pair just outside contact after float rounding
    let overlap = min_dist - dist + CONTACT_SLOP;
    let share_a = share_a.max(0.0).min(1.0);

    *a -= normal * (overlap * share_a);
    *b += normal * (overlap * (1.0 - share_a));
    true
}

// =============================================================================
// VECTOR HELPERS
// =============================================================================

/// Drop the vertical component.
#[inline]
pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Horizontal distance between two points.
#[inline]
pub fn distance_xz(a: Vec3, b: Vec3) -> f32 {
    horizontal(b - a).length()
}

/// Normalized horizontal direction, or `fallback` for zero-length input.
#[inline]
pub fn direction_xz_or(v: Vec3, fallback: Vec3) -> Vec3 {
    horizontal(v).try_normalize().unwrap_or(fallback)
}

/// Scale the horizontal part of `v` down to at most `max_len`.
#[inline]
pub fn clamp_horizontal(v: Vec3, max_len: f32) -> Vec3 {
    let flat = horizontal(v);
    let len = flat.length();
    if len > max_len && len > MIN_SEPARATION {
        let scaled = flat * (max_len / len);
        Vec3::new(scaled.x, v.y, scaled.z)
    } else {
        v
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::from_center_size(Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0))
    }

    #[test]
    fn test_circle_outside_box() {
        let aabb = unit_box();
        assert!(resolve_circle_aabb(Vec3::new(3.0, 0.0, 0.0), 0.5, &aabb).is_none());
    }

    #[test]
    fn test_circle_touching_face() {
        let aabb = unit_box();
        let push = resolve_circle_aabb(Vec3::new(1.3, 0.0, 0.0), 0.5, &aabb).unwrap();
        assert!((push.x - 0.2).abs() < 1e-5);
        assert_eq!(push.y, 0.0);
        assert!(push.z.abs() < 1e-6);
    }

    #[test]
    fn test_circle_centre_inside_uses_nearest_face() {
        let aabb = unit_box();
        let push = resolve_circle_aabb(Vec3::new(0.0, 0.0, -0.8), 0.5, &aabb).unwrap();
        // 0.2 to the -Z face plus the radius
        assert!((push.z + 0.7).abs() < 1e-5);
        assert_eq!(push.x, 0.0);
    }

    #[test]
    fn test_circle_non_finite_is_ignored() {
        let aabb = unit_box();
        assert!(resolve_circle_aabb(Vec3::new(f32::NAN, 0.0, 0.0), 0.5, &aabb).is_none());
    }

    #[test]
    fn test_penetration_least_axis() {
        let a = Aabb::from_center_size(Vec3::new(1.8, 0.0, 0.0), Vec3::splat(2.0));
        let b = unit_box();
        let pen = a.penetration(&b).unwrap();
        assert_eq!(pen.axis, Axis::X);
        assert!((pen.depth - 0.2).abs() < 1e-5);
        assert_eq!(pen.sign, 1.0);
    }

    #[test]
    fn test_penetration_skips_vertical_gap() {
        let above = Aabb::from_center_size(Vec3::new(0.5, 2.0, 0.0), Vec3::splat(2.0));
        assert!(above.penetration(&unit_box()).is_none());
    }

    #[test]
    fn test_separate_circles_reaches_min_distance() {
        let mut a = Vec3::new(0.0, 0.0, 0.0);
        let mut b = Vec3::new(0.3, 0.0, 0.0);
        assert!(separate_circles(&mut a, &mut b, 0.8, 0.5));
        assert!(distance_xz(a, b) >= 0.8);
        // Split evenly
        assert!((a.x + b.x - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_separate_coincident_circles() {
        let mut a = Vec3::new(1.0, 0.0, 1.0);
        let mut b = a;
        assert!(separate_circles(&mut a, &mut b, 0.8, 0.7));
        assert!(distance_xz(a, b) >= 0.8);
        assert!(b.x > a.x);
    }

    #[test]
    fn test_separate_circles_apart_is_noop() {
        let mut a = Vec3::ZERO;
        let mut b = Vec3::new(2.0, 0.0, 0.0);
        assert!(!separate_circles(&mut a, &mut b, 0.8, 0.5));
        assert_eq!(a, Vec3::ZERO);
    }

    #[test]
    fn test_clamp_horizontal_keeps_vertical() {
        let v = clamp_horizontal(Vec3::new(3.0, -5.0, 4.0), 1.0);
        assert!((horizontal(v).length() - 1.0).abs() < 1e-5);
        assert_eq!(v.y, -5.0);
    }
}
