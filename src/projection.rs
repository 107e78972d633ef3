//! Closed-form matrices for mirror cameras.
//!
//! - [`reflection_matrix`] mirrors world space across a plane.
//! - [`oblique_near_plane`] skews a perspective projection so its near plane
//!   coincides with an arbitrary eye-space plane (Lengyel's method, adapted to
//!   the `[0, 1]` depth range used by wgpu and [`Mat4::perspective_rh`]).
//! - [`position_from_view`] recovers the eye position of a rigid view matrix.
//!
//! A mirror camera's view is `parent_view * reflection_matrix(mirror_plane)`.
//! Its projection is the parent projection with the mirror plane as the near
//! plane, so geometry between the reflected eye and the mirror is clipped
//! away exactly at the mirror surface.

use glam::{Mat4, Vec3, Vec4};

use crate::plane::Plane;

/// Builds the affine matrix that reflects points across `plane`.
///
/// The plane normal must be unit length.
///
/// # Example
///
/// ```
/// use speculum::{projection, Plane, Vec3};
///
/// // the plane y = 1
/// let reflect = projection::reflection_matrix(Plane::new(Vec3::Y, -1.0));
/// let p = reflect.transform_point3(Vec3::new(2.0, 3.0, 0.0));
/// assert!((p - Vec3::new(2.0, -1.0, 0.0)).length() < 1e-6);
/// ```
pub fn reflection_matrix(plane: Plane) -> Mat4 {
    let n = plane.normal;
    let d = plane.d;
    Mat4::from_cols(
        Vec4::new(1.0 - 2.0 * n.x * n.x, -2.0 * n.y * n.x, -2.0 * n.z * n.x, 0.0),
        Vec4::new(-2.0 * n.x * n.y, 1.0 - 2.0 * n.y * n.y, -2.0 * n.z * n.y, 0.0),
        Vec4::new(-2.0 * n.x * n.z, -2.0 * n.y * n.z, 1.0 - 2.0 * n.z * n.z, 0.0),
        Vec4::new(-2.0 * n.x * d, -2.0 * n.y * d, -2.0 * n.z * d, 1.0),
    )
}

/// Transforms a world-space plane into the eye space of `view`.
///
/// `point` is any point on the plane; it avoids inverting the view matrix.
pub fn eye_space_plane(view: Mat4, plane: Plane, point: Vec3) -> Vec4 {
    let normal = view.transform_vector3(plane.normal);
    let pos = view.transform_point3(point);
    normal.extend(-pos.dot(normal))
}

/// Replaces the near plane of a `[0, 1]` depth perspective projection with
/// `clip_plane`, given in eye space with the visible side positive.
///
/// The far plane is tilted as little as possible so that it still bounds the
/// original frustum. Depth precision degrades as the clip plane becomes
/// parallel to the view direction.
pub fn oblique_near_plane(projection: Mat4, clip_plane: Vec4) -> Mat4 {
    let mut m = projection;

    // corner of the far plane opposite the clip plane, in eye space
    let q = Vec4::new(
        clip_plane.x.signum() / m.x_axis.x,
        clip_plane.y.signum() / m.y_axis.y,
        -1.0,
        (1.0 + m.z_axis.z) / m.w_axis.z,
    );
    let c = clip_plane * (1.0 / clip_plane.dot(q));

    m.x_axis.z = c.x;
    m.y_axis.z = c.y;
    m.z_axis.z = c.z;
    m.w_axis.z = c.w;
    m
}

/// Recovers the world-space eye position of a view matrix without inverting
/// it.
///
/// Valid for rigid transforms composed with reflections, which is every view
/// matrix in a mirror tree: the upper 3x3 block is orthonormal, so the eye is
/// `-R^T * t`.
pub fn position_from_view(view: Mat4) -> Vec3 {
    let t = view.w_axis;
    Vec3::new(
        -t.dot(view.x_axis),
        -t.dot(view.y_axis),
        -t.dot(view.z_axis),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflection_is_involution() {
        let plane = Plane::from_point_normal(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 1.0, 0.0).normalize());
        let r = reflection_matrix(plane);
        assert!((r * r).abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_reflection_fixes_plane_points() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, -4.0), Vec3::Z);
        let r = reflection_matrix(plane);
        let on_plane = Vec3::new(3.0, -2.0, -4.0);
        assert!((r.transform_point3(on_plane) - on_plane).length() < 1e-5);
        let off = r.transform_point3(Vec3::new(0.0, 0.0, -1.0));
        assert!((off - Vec3::new(0.0, 0.0, -7.0)).length() < 1e-5);
    }

    #[test]
    fn test_position_from_view_matches_look_at() {
        let eye = Vec3::new(3.0, 1.5, -2.0);
        let view = Mat4::look_at_rh(eye, Vec3::new(0.0, 1.0, 0.0), Vec3::Y);
        assert!((position_from_view(view) - eye).length() < 1e-4);
    }

    #[test]
    fn test_position_from_reflected_view() {
        let eye = Vec3::new(0.0, 1.0, 5.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let mirror = Plane::from_point_normal(Vec3::ZERO, Vec3::Z);
        let reflected = view * reflection_matrix(mirror);
        let pos = position_from_view(reflected);
        assert!((pos - Vec3::new(0.0, 1.0, -5.0)).length() < 1e-4);
    }

    #[test]
    fn test_oblique_near_plane_clips_at_plane() {
        let proj = Mat4::perspective_rh(1.2, 1.0, 0.1, 100.0);
        // eye space plane z = -3 facing away from the eye: keep z < -3
        let plane = Vec4::new(0.0, 0.0, -1.0, -3.0);
        let oblique = oblique_near_plane(proj, plane);

        let ndc_z = |z: f32| {
            let clip = oblique * Vec4::new(0.0, 0.0, z, 1.0);
            clip.z / clip.w
        };
        assert!(ndc_z(-3.0).abs() < 1e-4);
        assert!(ndc_z(-2.0) < 0.0);
        assert!(ndc_z(-10.0) > 0.0 && ndc_z(-10.0) <= 1.0);
    }

    #[test]
    fn test_eye_space_plane_keeps_side() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let plane = Plane::from_point_normal(Vec3::ZERO, Vec3::Z);
        let es = eye_space_plane(view, plane, Vec3::ZERO);
        // the eye is on the positive side in both spaces
        assert!(es.w > 0.0);
        assert!((es.truncate() - Vec3::Z).length() < 1e-5);
    }
}
