//! Axis-aligned bounding boxes and box-versus-frustum classification.

use glam::{Mat4, Vec3};

use crate::plane::Frustum;

/// An axis-aligned bounding box.
///
/// # Example
///
/// ```
/// use speculum::{Aabb, Vec3};
///
/// let unit = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
/// assert_eq!(unit.center(), Vec3::ZERO);
/// assert_eq!(unit.corners().len(), 8);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

/// How a box relates to a frustum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrustumStatus {
    /// Every corner is inside every plane.
    Inside,
    /// Neither fully inside nor rejected by any single plane.
    Intersecting,
    /// All corners are outside at least one plane.
    Outside,
}

impl Aabb {
    /// An inverted box that any [`expand`](Self::expand) replaces.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point. Returns [`Aabb::EMPTY`] for no
    /// points.
    pub fn from_points(points: &[Vec3]) -> Self {
        points.iter().fold(Self::EMPTY, |b, &p| b.expand_point(p))
    }

    pub fn expand_point(self, p: Vec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    pub fn expand(self, other: Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    /// The eight corners, in binary order: bit 0 selects max x, bit 1 max y,
    /// bit 2 max z.
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Corners transformed by `matrix`.
    pub fn transformed_corners(&self, matrix: Mat4) -> [Vec3; 8] {
        self.corners().map(|c| matrix.transform_point3(c))
    }

    /// Bounds of this box after transforming it by `matrix`.
    pub fn transformed(&self, matrix: Mat4) -> Self {
        Self::from_points(&self.transformed_corners(matrix))
    }

    /// Classifies this box against `frustum` using its corners.
    pub fn classify(&self, frustum: &Frustum) -> FrustumStatus {
        classify_points(frustum, &self.corners())
    }
}

/// Classifies a set of corner points against every plane of `frustum`.
///
/// A plane rejects the points when all of them are strictly outside it.
pub fn classify_points(frustum: &Frustum, points: &[Vec3]) -> FrustumStatus {
    let mut status = FrustumStatus::Inside;
    for plane in frustum.planes() {
        let outside = points.iter().filter(|p| plane.distance(**p) < 0.0).count();
        if outside == points.len() {
            return FrustumStatus::Outside;
        }
        if outside > 0 {
            status = FrustumStatus::Intersecting;
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::Plane;

    fn slab() -> Frustum {
        // -1 < x < 1
        Frustum::from_planes(&[Plane::new(Vec3::X, 1.0), Plane::new(-Vec3::X, 1.0)])
    }

    #[test]
    fn test_from_points() {
        let b = Aabb::from_points(&[Vec3::new(1.0, -2.0, 3.0), Vec3::new(-1.0, 4.0, 0.0)]);
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 4.0, 3.0));
    }

    #[test]
    fn test_transformed_bounds() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = b.transformed(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert!((moved.center() - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-6);
        assert!((moved.extents() - Vec3::splat(2.0)).length() < 1e-6);
    }

    #[test]
    fn test_classify() {
        let inside = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
        let straddling = Aabb::new(Vec3::new(0.5, 0.0, 0.0), Vec3::new(1.5, 1.0, 1.0));
        let outside = Aabb::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0));

        assert_eq!(inside.classify(&slab()), FrustumStatus::Inside);
        assert_eq!(straddling.classify(&slab()), FrustumStatus::Intersecting);
        assert_eq!(outside.classify(&slab()), FrustumStatus::Outside);
    }
}
