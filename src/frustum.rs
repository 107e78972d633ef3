//! Frustum plane extraction.
//!
//! Two sources of planes are supported:
//!
//! - A view-projection matrix, using Gribb-Hartmann extraction for a clip
//!   volume with depth in `[0, 1]` (what [`Mat4::perspective_rh`] produces).
//! - A convex polygon seen from an eye position. Each edge spans a plane
//!   through the eye, giving a pyramid whose cross-section is the polygon.
//!
//! Mirror cameras combine both: near and far come from the (oblique)
//! projection, the sides come from the clipped mirror polygon.
//!
//! # Example
//!
//! ```
//! use speculum::{frustum, Mat4, Vec3};
//!
//! let proj = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0);
//! let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
//! let planes = frustum::from_view_projection(proj * view);
//!
//! assert_eq!(planes.len(), 6);
//! assert!(planes.contains_point(Vec3::ZERO));
//! ```

use glam::{Mat4, Vec3};

use crate::plane::{Frustum, Plane};

/// Extracts the six canonical planes from a view-projection matrix.
///
/// Planes come out in the order near, far, left, right, bottom, top, each
/// normalized so distances are in world units.
pub fn from_view_projection(view_proj: Mat4) -> Frustum {
    let r0 = view_proj.row(0);
    let r1 = view_proj.row(1);
    let r2 = view_proj.row(2);
    let r3 = view_proj.row(3);

    Frustum::from_planes(&[
        Plane::from_vec4_normalized(r2),
        Plane::from_vec4_normalized(r3 - r2),
        Plane::from_vec4_normalized(r3 + r0),
        Plane::from_vec4_normalized(r3 - r0),
        Plane::from_vec4_normalized(r3 + r1),
        Plane::from_vec4_normalized(r3 - r1),
    ])
}

/// Extracts only the near and far planes from a view-projection matrix.
pub fn near_far_from_view_projection(view_proj: Mat4) -> [Plane; 2] {
    let r2 = view_proj.row(2);
    let r3 = view_proj.row(3);
    [
        Plane::from_vec4_normalized(r2),
        Plane::from_vec4_normalized(r3 - r2),
    ]
}

/// Builds the plane spanned by the eye and the edge `prev -> curr`.
///
/// Returns [`Plane::ZERO`] when the edge is degenerate (coincident vertices,
/// or an edge collinear with the eye). Such a plane never culls.
pub fn edge_plane(eye: Vec3, prev: Vec3, curr: Vec3) -> Plane {
    let normal = (eye - curr).cross(curr - prev);
    let len = normal.length();
    if len <= f32::EPSILON {
        return Plane::ZERO;
    }
    Plane::from_point_normal(curr, normal / len)
}

/// Appends one edge plane per polygon vertex to `frustum`, in vertex order.
///
/// Vertex `i` contributes the plane through edge `(i - 1) -> i`, wrapping
/// around so vertex 0 uses the last vertex as its predecessor.
///
/// Returns the number of degenerate planes produced.
pub fn push_edge_planes(frustum: &mut Frustum, polygon: &[Vec3], eye: Vec3) -> usize {
    let Some(&last) = polygon.last() else {
        return 0;
    };

    let mut degenerate = 0;
    let mut prev = last;
    for &curr in polygon {
        let plane = edge_plane(eye, prev, curr);
        if plane.is_degenerate() {
            degenerate += 1;
        }
        frustum.push(plane);
        prev = curr;
    }
    degenerate
}

/// Builds the frustum of a mirror camera.
///
/// The result holds near and far from `view_proj`, followed by one edge plane
/// per vertex of `polygon` as seen from `eye`.
///
/// # Arguments
///
/// * `view_proj` - The mirror camera's view-projection matrix
/// * `polygon` - The clipped mirror polygon, in world space
/// * `eye` - The mirror camera's world position
///
/// # Returns
///
/// The frustum and the number of degenerate edge planes it contains.
pub fn from_polygon(view_proj: Mat4, polygon: &[Vec3], eye: Vec3) -> (Frustum, usize) {
    let mut frustum = Frustum::from_planes(&near_far_from_view_projection(view_proj));
    let degenerate = push_edge_planes(&mut frustum, polygon, eye);
    (frustum, degenerate)
}
