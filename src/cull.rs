//! Per-camera visibility culling of draw nodes.
//!
//! Two tests are combined:
//!
//! - [`is_visible_clip_space`] transforms a node's bounds by the camera's
//!   view-projection and rejects boxes fully outside one side of the clip
//!   volume. It then checks the other direction, rejecting when the frustum's
//!   corners are all outside one side of the box, which catches large boxes
//!   near frustum corners that straddle every plane.
//! - [`is_visible_world_space`] tests world-space box corners against an
//!   arbitrary plane list. Mirror cameras use it with their edge planes, which
//!   are tighter than the projection's side planes.
//!
//! Both are conservative: they may keep invisible nodes, never drop visible
//! ones. Instanced nodes are not culled.

use glam::{Mat4, Vec3, Vec4};

use crate::aabb::{classify_points, Aabb, FrustumStatus};
use crate::plane::Frustum;
use crate::scene::SceneView;
use crate::tree::CameraNode;

/// Clip volume corners in NDC, depth in `[0, 1]`.
const NDC_CORNERS: [Vec3; 8] = [
    Vec3::new(-1.0, -1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
    Vec3::new(-1.0, 1.0, 0.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(-1.0, -1.0, 1.0),
    Vec3::new(1.0, -1.0, 1.0),
    Vec3::new(-1.0, 1.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
];

/// Returns false when `local` bounds, placed by `world`, cannot be seen
/// through `view_proj`.
pub fn is_visible_clip_space(view_proj: Mat4, world: Mat4, local: &Aabb) -> bool {
    let mvp = view_proj * world;
    let clip: [Vec4; 8] = local.corners().map(|c| mvp * c.extend(1.0));

    let all = |outside: fn(&Vec4) -> bool| clip.iter().all(outside);
    if all(|c| c.z < 0.0)
        || all(|c| c.z > c.w)
        || all(|c| c.x < -c.w)
        || all(|c| c.x > c.w)
        || all(|c| c.y < -c.w)
        || all(|c| c.y > c.w)
    {
        return false;
    }

    // frustum against the box, in the box's own space
    let inverse = mvp.inverse();
    if !inverse.is_finite() {
        return true;
    }
    let corners = NDC_CORNERS.map(|c| inverse.project_point3(c));
    if !corners.iter().all(|c| c.is_finite()) {
        return true;
    }
    let (min, max) = (local.min, local.max);
    let any_axis_separated = (0..3).any(|axis| {
        corners.iter().all(|c| c[axis] < min[axis]) || corners.iter().all(|c| c[axis] > max[axis])
    });
    !any_axis_separated
}

/// Returns false when every corner is outside the same plane of `frustum`.
pub fn is_visible_world_space(frustum: &Frustum, corners: &[Vec3; 8]) -> bool {
    classify_points(frustum, corners) != FrustumStatus::Outside
}

/// Indices of the draw nodes visible from one camera.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibleSet {
    pub nodes: Vec<usize>,
}

impl VisibleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: usize) -> bool {
        self.nodes.contains(&node)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// Culls draw nodes for every camera of a frame.
///
/// World-space corners are computed once per frame by [`prepare`] and shared
/// by all mirror cameras.
///
/// [`prepare`]: Culler::prepare
#[derive(Clone, Debug, Default)]
pub struct Culler {
    world_corners: Vec<[Vec3; 8]>,
}

impl Culler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches the world-space corners of every draw node in `scene`.
    pub fn prepare<S: SceneView + ?Sized>(&mut self, scene: &S) {
        self.world_corners.clear();
        self.world_corners
            .extend(scene.draw_nodes().iter().map(|n| n.world_corners()));
    }

    /// Fills `visible` with the draw nodes `camera` can see.
    ///
    /// The root camera uses the clip-space test only. Mirror cameras also
    /// test against their full plane list, edge planes included.
    pub fn cull<S: SceneView + ?Sized>(
        &self,
        camera: &CameraNode,
        scene: &S,
        visible: &mut VisibleSet,
    ) {
        visible.clear();
        for (index, node) in scene.draw_nodes().iter().enumerate() {
            if !is_visible_clip_space(camera.view_proj, node.world, &node.bounds) {
                continue;
            }
            if !camera.is_root() {
                let corners = match self.world_corners.get(index) {
                    Some(corners) => *corners,
                    None => node.world_corners(),
                };
                if !is_visible_world_space(&camera.frustum, &corners) {
                    continue;
                }
            }
            visible.nodes.push(index);
        }
    }
}

/// Culls `scene` for a single camera without a shared cache.
pub fn cull_node<S: SceneView + ?Sized>(camera: &CameraNode, scene: &S) -> VisibleSet {
    let mut visible = VisibleSet::new();
    Culler::new().cull(camera, scene, &mut visible);
    visible
}
