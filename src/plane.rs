//! Half-space planes and fixed-capacity frustums.
//!
//! A [`Plane`] stores a normal and an offset. A point `p` is inside when
//! `normal.dot(p) + d > 0`. A [`Frustum`] is an ordered list of such planes
//! and a point is inside the frustum when it is inside every plane.
//!
//! Frustums are small and `Copy`: the root camera uses the six canonical
//! planes, and a mirror camera uses near and far plus one plane per edge of
//! its clipped mirror polygon.
//!
//! # Example
//!
//! ```
//! use speculum::{Frustum, Plane, Vec3};
//!
//! let mut frustum = Frustum::new();
//! frustum.push(Plane::new(Vec3::X, 1.0)); // x > -1
//! frustum.push(Plane::new(-Vec3::X, 1.0)); // x < 1
//!
//! assert!(frustum.contains_point(Vec3::ZERO));
//! assert!(!frustum.contains_point(Vec3::new(2.0, 0.0, 0.0)));
//! ```

use glam::{Vec3, Vec4};

use crate::clip::MAX_CLIP_VERTICES;

/// Maximum number of planes a [`Frustum`] can hold.
///
/// Near and far, plus one edge plane for every vertex a clipped mirror
/// polygon can have.
pub const MAX_PLANES: usize = 2 + MAX_CLIP_VERTICES;

/// An oriented plane. Points with positive signed distance are inside.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Plane {
    /// Plane normal. Unit length for every plane built by this crate,
    /// except degenerate edge planes, which are all zero.
    pub normal: Vec3,
    /// Offset such that `normal.dot(p) + d == 0` on the plane.
    pub d: f32,
}

impl Plane {
    /// A degenerate plane that never rejects anything.
    pub const ZERO: Self = Self {
        normal: Vec3::ZERO,
        d: 0.0,
    };

    /// Creates a plane from a normal and an offset.
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    /// Creates the plane through `point` facing `normal`.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self {
            normal,
            d: -normal.dot(point),
        }
    }

    /// Creates a plane from packed `(nx, ny, nz, d)` coefficients.
    pub fn from_vec4(v: Vec4) -> Self {
        Self {
            normal: v.truncate(),
            d: v.w,
        }
    }

    /// Creates a plane from packed coefficients and rescales it so the normal
    /// has unit length.
    ///
    /// Coefficients with a zero-length normal yield [`Plane::ZERO`].
    pub fn from_vec4_normalized(v: Vec4) -> Self {
        let len = v.truncate().length();
        if len > f32::EPSILON {
            Self::from_vec4(v / len)
        } else {
            Self::ZERO
        }
    }

    /// Packs the plane as `(nx, ny, nz, d)`.
    pub fn to_vec4(self) -> Vec4 {
        self.normal.extend(self.d)
    }

    /// Signed distance from `point` to the plane (scaled by the normal length).
    #[inline]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }

    /// Returns the same plane facing the other way.
    pub fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            d: -self.d,
        }
    }

    /// Returns true for all-zero planes, which never cull.
    pub fn is_degenerate(&self) -> bool {
        self.normal == Vec3::ZERO
    }
}

/// An ordered, fixed-capacity list of planes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    planes: [Plane; MAX_PLANES],
    count: usize,
}

impl Default for Frustum {
    fn default() -> Self {
        Self {
            planes: [Plane::ZERO; MAX_PLANES],
            count: 0,
        }
    }
}

impl Frustum {
    /// Creates an empty frustum. An empty frustum contains everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a frustum from a slice of planes, keeping at most
    /// [`MAX_PLANES`] of them.
    pub fn from_planes(planes: &[Plane]) -> Self {
        let mut frustum = Self::new();
        for plane in planes.iter().take(MAX_PLANES) {
            frustum.push(*plane);
        }
        frustum
    }

    /// Appends a plane. Returns false, leaving the frustum unchanged, when it
    /// is already full.
    pub fn push(&mut self, plane: Plane) -> bool {
        if self.count == MAX_PLANES {
            return false;
        }
        self.planes[self.count] = plane;
        self.count += 1;
        true
    }

    /// The planes in insertion order.
    pub fn planes(&self) -> &[Plane] {
        &self.planes[..self.count]
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true when `point` is inside or on every plane.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes().iter().all(|p| p.distance(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_sign() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 1.0, 0.0), Vec3::Y);
        assert!(plane.distance(Vec3::new(0.0, 2.0, 0.0)) > 0.0);
        assert!(plane.distance(Vec3::ZERO) < 0.0);
        assert!(plane.distance(Vec3::new(5.0, 1.0, -3.0)).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_from_vec4() {
        let plane = Plane::from_vec4_normalized(Vec4::new(0.0, 0.0, 2.0, 4.0));
        assert!((plane.normal - Vec3::Z).length() < 1e-6);
        assert!((plane.d - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_normal_is_degenerate() {
        let plane = Plane::from_vec4_normalized(Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert!(plane.is_degenerate());
        assert_eq!(plane.distance(Vec3::splat(100.0)), 0.0);
    }

    #[test]
    fn test_flipped_negates_distance() {
        let plane = Plane::new(Vec3::X, -1.0);
        let p = Vec3::new(3.0, 0.0, 0.0);
        assert_eq!(plane.flipped().distance(p), -plane.distance(p));
    }

    #[test]
    fn test_frustum_capacity() {
        let mut frustum = Frustum::new();
        for _ in 0..MAX_PLANES {
            assert!(frustum.push(Plane::new(Vec3::X, 1.0)));
        }
        assert!(!frustum.push(Plane::new(Vec3::Y, 1.0)));
        assert_eq!(frustum.len(), MAX_PLANES);
    }

    #[test]
    fn test_empty_frustum_contains_everything() {
        let frustum = Frustum::new();
        assert!(frustum.is_empty());
        assert!(frustum.contains_point(Vec3::splat(-1.0e6)));
    }
}
