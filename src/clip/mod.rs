//! Convex polygon clipping against ordered plane lists.
//!
//! Mirror polygons are clipped against their parent camera's frustum before
//! they spawn a child camera. Two interchangeable strategies implement the
//! same [`PolygonClipper`] contract:
//!
//! - [`ScalarClipper`] walks the polygon edge by edge (Sutherland-Hodgman).
//! - [`WideClipper`] evaluates all vertex distances for a plane at once and
//!   finds the cut with a 256-entry lookup table keyed by the bitmask of
//!   vertices outside the plane.
//!
//! Both take a polygon of at most [`MAX_CLIP_VERTICES`] vertices, clip it in
//! place plane by plane, and stop early once fewer than three vertices are
//! left. A result with fewer than three vertices means the polygon is fully
//! clipped.
//!
//! Vertices within `epsilon` of a plane count as on the plane and are kept
//! without generating an intersection. The polygon must be convex and
//! consistently wound.
//!
//! # Example
//!
//! ```
//! use speculum::clip::{ClipPolygon, ClipStrategy, Clipper, PolygonClipper};
//! use speculum::{Plane, Vec3};
//!
//! let clipper = Clipper::new(ClipStrategy::Wide, 1e-3);
//! let mut quad = ClipPolygon::from_slice(&[
//!     Vec3::new(-1.0, -1.0, 0.0),
//!     Vec3::new(1.0, -1.0, 0.0),
//!     Vec3::new(1.0, 1.0, 0.0),
//!     Vec3::new(-1.0, 1.0, 0.0),
//! ]);
//!
//! // keep x < 0.5
//! clipper.clip(&mut quad, &[Plane::new(-Vec3::X, 0.5)]);
//! assert_eq!(quad.len(), 4);
//! assert!(quad.iter().all(|v| v.x <= 0.5 + 1e-5));
//! ```

mod scalar;
mod wide;

pub use scalar::ScalarClipper;
pub use wide::WideClipper;

use glam::Vec3;

use crate::plane::Plane;

/// Maximum number of vertices a clipped polygon can hold.
pub const MAX_CLIP_VERTICES: usize = 8;

/// Default on-plane tolerance, in world units.
pub const DEFAULT_CLIP_EPSILON: f32 = 1.0e-3;

/// A convex polygon with inline storage for up to [`MAX_CLIP_VERTICES`]
/// vertices.
#[derive(Clone, Copy, Debug)]
pub struct ClipPolygon {
    vertices: [Vec3; MAX_CLIP_VERTICES],
    len: usize,
}

impl Default for ClipPolygon {
    fn default() -> Self {
        Self {
            vertices: [Vec3::ZERO; MAX_CLIP_VERTICES],
            len: 0,
        }
    }
}

// stale lanes past `len` do not take part in equality
impl PartialEq for ClipPolygon {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl ClipPolygon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies up to [`MAX_CLIP_VERTICES`] vertices from `vertices`.
    pub fn from_slice(vertices: &[Vec3]) -> Self {
        let mut polygon = Self::new();
        for &v in vertices.iter().take(MAX_CLIP_VERTICES) {
            polygon.push(v);
        }
        polygon
    }

    /// Appends a vertex. When the polygon is full the last vertex is replaced
    /// instead, so the vertex count never exceeds the cap.
    #[inline]
    pub fn push(&mut self, v: Vec3) {
        if self.len < MAX_CLIP_VERTICES {
            self.vertices[self.len] = v;
            self.len += 1;
        } else {
            self.vertices[MAX_CLIP_VERTICES - 1] = v;
        }
    }

    /// Replaces the most recently pushed vertex, or pushes when empty.
    #[inline]
    pub(crate) fn replace_last(&mut self, v: Vec3) {
        if self.len == 0 {
            self.push(v);
        } else {
            self.vertices[self.len - 1] = v;
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when enough vertices remain to enclose an area.
    pub fn is_polygon(&self) -> bool {
        self.len >= 3
    }

    pub fn as_slice(&self) -> &[Vec3] {
        &self.vertices[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec3> {
        self.as_slice().iter()
    }

    /// The full backing array. Lanes at and beyond `len()` are stale.
    pub(crate) fn lanes(&self) -> &[Vec3; MAX_CLIP_VERTICES] {
        &self.vertices
    }
}

/// Clips convex polygons against an ordered list of planes.
pub trait PolygonClipper {
    /// Clips `polygon` in place against every plane in `planes`, in order.
    ///
    /// Stops as soon as fewer than three vertices remain.
    fn clip(&self, polygon: &mut ClipPolygon, planes: &[Plane]);
}

/// Which clipping implementation to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipStrategy {
    /// Edge-by-edge Sutherland-Hodgman.
    #[default]
    Scalar,
    /// Whole-polygon distance evaluation with a transition lookup table.
    Wide,
}

/// A clipper selected at runtime from a [`ClipStrategy`].
#[derive(Clone, Copy, Debug)]
pub enum Clipper {
    Scalar(ScalarClipper),
    Wide(WideClipper),
}

impl Clipper {
    /// Creates the clipper for `strategy` with the given on-plane tolerance.
    pub fn new(strategy: ClipStrategy, epsilon: f32) -> Self {
        match strategy {
            ClipStrategy::Scalar => Self::Scalar(ScalarClipper::new(epsilon)),
            ClipStrategy::Wide => Self::Wide(WideClipper::new(epsilon)),
        }
    }

    pub fn strategy(&self) -> ClipStrategy {
        match self {
            Self::Scalar(_) => ClipStrategy::Scalar,
            Self::Wide(_) => ClipStrategy::Wide,
        }
    }
}

impl PolygonClipper for Clipper {
    fn clip(&self, polygon: &mut ClipPolygon, planes: &[Plane]) {
        match self {
            Self::Scalar(c) => c.clip(polygon, planes),
            Self::Wide(c) => c.clip(polygon, planes),
        }
    }
}

/// Point where edge `a -> b` crosses the plane, given the signed distances of
/// both endpoints. The distances must have opposite signs.
#[inline]
pub(crate) fn intersect(a: Vec3, b: Vec3, dist_a: f32, dist_b: f32) -> Vec3 {
    let t = dist_a / (dist_a - dist_b);
    a + (b - a) * t
}
