#![allow(dead_code)]

use speculum::{CameraNode, Mat4, MirrorCatalog, Vec3};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A square mirror centered at `center` whose reflective side faces `normal`.
///
/// Vertices wind clockwise seen from that side.
pub fn quad_facing(center: Vec3, normal: Vec3, half: f32) -> [Vec3; 4] {
    let up = if normal.y.abs() > 0.9 { Vec3::Z } else { Vec3::Y };
    let right = (-normal).cross(up).normalize() * half;
    let up = up * half;
    [
        center - right - up,
        center - right + up,
        center + right + up,
        center + right - up,
    ]
}

pub fn perspective() -> Mat4 {
    Mat4::perspective_rh(1.2, 1.0, 0.1, 100.0)
}

pub fn root_looking_at(eye: Vec3, target: Vec3) -> CameraNode {
    CameraNode::root(Mat4::look_at_rh(eye, target, Vec3::Y), perspective(), eye)
}

/// Two parallel mirrors at z = -2 and z = 2 facing each other.
pub fn facing_pair() -> MirrorCatalog {
    MirrorCatalog::from_polygons(&[
        quad_facing(Vec3::new(0.0, 0.0, -2.0), Vec3::Z, 1.0),
        quad_facing(Vec3::new(0.0, 0.0, 2.0), Vec3::NEG_Z, 1.0),
    ])
    .unwrap()
}

/// Slightly off-center eye between the facing pair, looking at the z = -2
/// mirror.
pub fn facing_pair_eye() -> CameraNode {
    let eye = Vec3::new(0.2, 0.1, 0.0);
    root_looking_at(eye, Vec3::new(0.2, 0.1, -1.0))
}

/// Four inward-facing walls of a 6 x 6 room.
pub fn mirror_room() -> MirrorCatalog {
    MirrorCatalog::from_polygons(&[
        quad_facing(Vec3::new(-3.0, 0.0, 0.0), Vec3::X, 1.5),
        quad_facing(Vec3::new(3.0, 0.0, 0.0), Vec3::NEG_X, 1.5),
        quad_facing(Vec3::new(0.0, 0.0, -3.0), Vec3::Z, 1.5),
        quad_facing(Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z, 1.5),
    ])
    .unwrap()
}
