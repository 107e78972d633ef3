//! The renderable scene as the mirror renderer sees it.
//!
//! The renderer only needs to enumerate what can be drawn: plain draw nodes
//! with a world transform and local bounds, and instanced nodes that share
//! their meshes across a list of transforms. Anything that can hand those out
//! implements [`SceneView`]; [`Scene`] is a plain owned implementation.
//!
//! # Example
//!
//! ```
//! use speculum::{Aabb, DrawNode, MeshHandle, Scene, SceneView, ShaderTechnique, Vec3, Vec4};
//!
//! let mut scene = Scene::new();
//! let cube = scene.add_node(
//!     DrawNode::new(MeshHandle(0), ShaderTechnique::Color3D)
//!         .at(Vec3::new(0.0, 0.0, -5.0))
//!         .bounds(Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)))
//!         .color(Vec4::new(1.0, 0.2, 0.2, 1.0)),
//! );
//! assert_eq!(scene.draw_nodes()[cube].world_corners().len(), 8);
//! ```

use glam::{Mat4, Vec3, Vec4};

use crate::aabb::Aabb;
use crate::drawlist::ShaderTechnique;

/// Type-safe handle to a mesh owned by the rendering backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub usize);

/// One piece of geometry and the technique used to shade it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawMesh {
    pub mesh: MeshHandle,
    pub technique: ShaderTechnique,
}

/// A drawable object: one or more meshes sharing a transform and color.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawNode {
    pub world: Mat4,
    /// Bounds in the node's local space.
    pub bounds: Aabb,
    pub meshes: Vec<DrawMesh>,
    /// Group color. Alpha below 1 puts the node in the alpha bucket.
    pub color: Vec4,
}

impl DrawNode {
    /// Creates a node with one mesh, an identity transform and unit bounds.
    pub fn new(mesh: MeshHandle, technique: ShaderTechnique) -> Self {
        Self {
            world: Mat4::IDENTITY,
            bounds: Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
            meshes: vec![DrawMesh { mesh, technique }],
            color: Vec4::ONE,
        }
    }

    pub fn world(mut self, world: Mat4) -> Self {
        self.world = world;
        self
    }

    /// Sets the world transform to a pure translation.
    pub fn at(mut self, position: Vec3) -> Self {
        self.world = Mat4::from_translation(position);
        self
    }

    pub fn bounds(mut self, bounds: Aabb) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    /// Adds another mesh drawn with the same transform.
    pub fn with_mesh(mut self, mesh: MeshHandle, technique: ShaderTechnique) -> Self {
        self.meshes.push(DrawMesh { mesh, technique });
        self
    }

    /// World-space origin, used for draw ordering.
    pub fn position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }

    pub fn is_transparent(&self) -> bool {
        self.color.w < 1.0
    }

    /// The corners of the local bounds, in world space.
    pub fn world_corners(&self) -> [Vec3; 8] {
        self.bounds.transformed_corners(self.world)
    }
}

/// Meshes drawn once per transform in `instances[..active]`.
#[derive(Clone, Debug, PartialEq)]
pub struct InstancedNode {
    pub meshes: Vec<DrawMesh>,
    pub color: Vec4,
    pub instances: Vec<Mat4>,
    /// How many leading entries of `instances` are drawn.
    pub active: usize,
}

impl InstancedNode {
    pub fn new(mesh: MeshHandle, instances: Vec<Mat4>) -> Self {
        let active = instances.len();
        Self {
            meshes: vec![DrawMesh {
                mesh,
                technique: ShaderTechnique::Instanced3D,
            }],
            color: Vec4::ONE,
            instances,
            active,
        }
    }

    pub fn color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    /// The transforms that are currently drawn.
    pub fn active_instances(&self) -> &[Mat4] {
        &self.instances[..self.active.min(self.instances.len())]
    }

    pub fn is_transparent(&self) -> bool {
        self.color.w < 1.0
    }
}

/// Read access to the drawable content of a scene.
pub trait SceneView {
    fn draw_nodes(&self) -> &[DrawNode];
    fn instanced_nodes(&self) -> &[InstancedNode];
}

/// An owned list of draw nodes and instanced nodes.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub draw_nodes: Vec<DrawNode>,
    pub instanced_nodes: Vec<InstancedNode>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a draw node and returns its index.
    pub fn add_node(&mut self, node: DrawNode) -> usize {
        self.draw_nodes.push(node);
        self.draw_nodes.len() - 1
    }

    /// Adds an instanced node and returns its index.
    pub fn add_instanced(&mut self, node: InstancedNode) -> usize {
        self.instanced_nodes.push(node);
        self.instanced_nodes.len() - 1
    }
}

impl SceneView for Scene {
    fn draw_nodes(&self) -> &[DrawNode] {
        &self.draw_nodes
    }

    fn instanced_nodes(&self) -> &[InstancedNode] {
        &self.instanced_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_corners_follow_transform() {
        let node = DrawNode::new(MeshHandle(0), ShaderTechnique::Color3D)
            .at(Vec3::new(10.0, 0.0, 0.0));
        let corners = node.world_corners();
        assert!(corners.iter().all(|c| c.x >= 9.5 - 1e-6 && c.x <= 10.5 + 1e-6));
        assert_eq!(node.position(), Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_active_instances_clamped() {
        let mut node = InstancedNode::new(MeshHandle(1), vec![Mat4::IDENTITY; 3]);
        assert_eq!(node.active_instances().len(), 3);
        node.active = 10;
        assert_eq!(node.active_instances().len(), 3);
        node.active = 1;
        assert_eq!(node.active_instances().len(), 1);
    }

    #[test]
    fn test_transparency_from_alpha() {
        let node = DrawNode::new(MeshHandle(0), ShaderTechnique::Color3D);
        assert!(!node.is_transparent());
        assert!(node.color(Vec4::new(1.0, 1.0, 1.0, 0.5)).is_transparent());
    }
}
