//! Mirror polygons and the per-scene mirror catalog.
//!
//! A mirror is a flat convex polygon with three or four vertices. Vertices are
//! wound **clockwise when viewed from the reflective side**; the outward normal
//! is `(v2 - v0) x (v1 - v0)`. Seen from a reflected camera behind the mirror
//! the same vertices appear counter-clockwise, which is what the edge planes
//! of mirror frustums rely on.
//!
//! The catalog is built once per scene load, together with its optional
//! [`SpatialIndex`]. Mirror ids are indices into the catalog.
//!
//! # Example
//!
//! ```
//! use speculum::{MirrorCatalog, MirrorPolygon, Vec3};
//!
//! // a 2x2 mirror on the z = 0 plane, facing +z
//! let mirror = MirrorPolygon::new(&[
//!     Vec3::new(-1.0, -1.0, 0.0),
//!     Vec3::new(-1.0, 1.0, 0.0),
//!     Vec3::new(1.0, 1.0, 0.0),
//!     Vec3::new(1.0, -1.0, 0.0),
//! ])?;
//! assert!((mirror.normal() - Vec3::Z).length() < 1e-6);
//!
//! let catalog = MirrorCatalog::new(vec![mirror]).with_bvh();
//! assert_eq!(catalog.len(), 1);
//! # Ok::<(), speculum::MirrorError>(())
//! ```

use glam::{Vec3, Vec4};

use crate::clip::ClipPolygon;
use crate::error::{MirrorError, Result};
use crate::plane::{Frustum, Plane};
use crate::spatial::{Bvh, SpatialIndex};

/// Largest vertex count a catalog mirror may have.
pub const MAX_MIRROR_VERTICES: usize = 4;

/// A flat reflective polygon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MirrorPolygon {
    polygon: ClipPolygon,
    normal: Vec3,
    tint: Vec4,
}

impl MirrorPolygon {
    /// Creates a mirror from clockwise-wound vertices, deriving its normal.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidMirror`] for fewer than 3 or more than
    /// [`MAX_MIRROR_VERTICES`] vertices, or when the first three vertices are
    /// collinear. The id in the error is 0; the catalog fills in the real one
    /// when validating.
    pub fn new(vertices: &[Vec3]) -> Result<Self> {
        check_vertex_count(vertices.len())?;
        let normal = (vertices[2] - vertices[0]).cross(vertices[1] - vertices[0]);
        Self::with_normal(vertices, normal)
    }

    /// Creates a mirror with an explicit normal, normalizing it.
    pub fn with_normal(vertices: &[Vec3], normal: Vec3) -> Result<Self> {
        check_vertex_count(vertices.len())?;
        let normal = normal.try_normalize().ok_or_else(|| MirrorError::InvalidMirror {
            id: 0,
            reason: "zero-length normal".to_string(),
        })?;
        Ok(Self {
            polygon: ClipPolygon::from_slice(vertices),
            normal,
            tint: Vec4::new(1.0, 1.0, 1.0, 0.0),
        })
    }

    /// Sets the color blended over the reflection when the mirror is
    /// unmarked. Alpha 0 leaves the reflection untouched.
    pub fn tint(mut self, tint: Vec4) -> Self {
        self.tint = tint;
        self
    }

    pub fn vertices(&self) -> &[Vec3] {
        self.polygon.as_slice()
    }

    /// The vertices as a clippable copy.
    pub fn polygon(&self) -> ClipPolygon {
        self.polygon
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn tint_color(&self) -> Vec4 {
        self.tint
    }

    /// The mirror's supporting plane, positive on the reflective side.
    pub fn plane(&self) -> Plane {
        Plane::from_point_normal(self.polygon.as_slice()[0], self.normal)
    }

    /// Returns true when `eye` is strictly in front of the reflective side.
    pub fn faces(&self, eye: Vec3) -> bool {
        self.normal.dot(eye - self.polygon.as_slice()[0]) > 0.0
    }
}

fn check_vertex_count(count: usize) -> Result<()> {
    if (3..=MAX_MIRROR_VERTICES).contains(&count) {
        Ok(())
    } else {
        Err(MirrorError::InvalidMirror {
            id: 0,
            reason: format!("{count} vertices, expected 3 to {MAX_MIRROR_VERTICES}"),
        })
    }
}

/// All mirrors of a scene plus an optional spatial index over them.
#[derive(Default)]
pub struct MirrorCatalog {
    mirrors: Vec<MirrorPolygon>,
    index: Option<Box<dyn SpatialIndex>>,
}

impl MirrorCatalog {
    /// Creates a catalog without a spatial index. Every mirror is a candidate
    /// for every camera until an index is attached.
    pub fn new(mirrors: Vec<MirrorPolygon>) -> Self {
        Self {
            mirrors,
            index: None,
        }
    }

    /// Builds a catalog from raw vertex lists, deriving each normal.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidMirror`] naming the first bad polygon.
    pub fn from_polygons<P: AsRef<[Vec3]>>(polygons: &[P]) -> Result<Self> {
        let mirrors = polygons
            .iter()
            .enumerate()
            .map(|(id, p)| {
                MirrorPolygon::new(p.as_ref()).map_err(|err| match err {
                    MirrorError::InvalidMirror { reason, .. } => {
                        MirrorError::InvalidMirror { id, reason }
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(mirrors))
    }

    /// Attaches a [`Bvh`] built over the current mirrors.
    pub fn with_bvh(self) -> Self {
        let bvh = Bvh::build(&self.mirrors);
        self.with_index(Box::new(bvh))
    }

    /// Attaches a custom spatial index.
    pub fn with_index(mut self, index: Box<dyn SpatialIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&MirrorPolygon> {
        self.mirrors.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MirrorPolygon> {
        self.mirrors.iter()
    }

    /// Fills `candidates[i]` with whether mirror `i` may overlap `frustum`.
    ///
    /// Without an index every mirror is a candidate.
    pub fn candidates(&self, frustum: &Frustum, candidates: &mut [bool]) {
        match &self.index {
            Some(index) => {
                candidates.fill(false);
                index.query(frustum, candidates);
            }
            None => candidates.fill(true),
        }
    }
}

impl std::fmt::Debug for MirrorCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorCatalog")
            .field("mirrors", &self.mirrors.len())
            .field("indexed", &self.index.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facing_z() -> [Vec3; 4] {
        [
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
        ]
    }

    #[test]
    fn test_normal_from_clockwise_winding() {
        let mirror = MirrorPolygon::new(&facing_z()).unwrap();
        assert!((mirror.normal() - Vec3::Z).length() < 1e-6);
        assert!(mirror.faces(Vec3::new(0.0, 0.0, 3.0)));
        assert!(!mirror.faces(Vec3::new(0.0, 0.0, -3.0)));
    }

    #[test]
    fn test_rejects_bad_vertex_counts() {
        let two = [Vec3::ZERO, Vec3::X];
        assert!(MirrorPolygon::new(&two).is_err());
        let five = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE, Vec3::Z];
        assert!(MirrorPolygon::new(&five).is_err());
    }

    #[test]
    fn test_rejects_collinear() {
        let line = [Vec3::ZERO, Vec3::X, Vec3::X * 2.0];
        assert!(matches!(
            MirrorPolygon::new(&line),
            Err(MirrorError::InvalidMirror { .. })
        ));
    }

    #[test]
    fn test_catalog_reports_bad_id() {
        let good = facing_z().to_vec();
        let bad = vec![Vec3::ZERO, Vec3::X];
        let err = MirrorCatalog::from_polygons(&[good, bad]).unwrap_err();
        assert!(matches!(err, MirrorError::InvalidMirror { id: 1, .. }));
    }

    #[test]
    fn test_candidates_without_index() {
        let catalog = MirrorCatalog::from_polygons(&[facing_z(), facing_z()]).unwrap();
        let mut flags = [false; 2];
        catalog.candidates(&Frustum::new(), &mut flags);
        assert_eq!(flags, [true, true]);
    }

    #[test]
    fn test_plane_passes_through_vertices() {
        let mirror = MirrorPolygon::new(&facing_z()).unwrap();
        for v in mirror.vertices() {
            assert!(mirror.plane().distance(*v).abs() < 1e-6);
        }
    }
}
