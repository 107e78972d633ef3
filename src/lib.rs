//! # Speculum
//!
//! **Recursive planar mirrors for wgpu renderers.**
//!
//! Every frame, speculum bounces the main camera through the visible mirrors
//! of a scene and builds a tree of reflected cameras. Each reflected camera
//! gets a frustum clipped to exactly what can be seen through its mirror, a
//! culled and sorted draw list, and a slot in a stencil protocol that keeps
//! nested reflections inside their mirrors on screen.
//!
//! ## Quick Start
//!
//! ```
//! use speculum::*;
//!
//! # fn main() -> speculum::Result<()> {
//! // A 2x2 mirror at the origin, reflective side facing +Z
//! let catalog = MirrorCatalog::from_polygons(&[[
//!     Vec3::new(-1.0, -1.0, 0.0),
//!     Vec3::new(-1.0, 1.0, 0.0),
//!     Vec3::new(1.0, 1.0, 0.0),
//!     Vec3::new(1.0, -1.0, 0.0),
//! ]])?
//! .with_bvh();
//!
//! let mut scene = Scene::new();
//! scene.add_node(DrawNode::new(MeshHandle(0), ShaderTechnique::Color3D).at(Vec3::new(0.0, 0.0, 2.0)));
//!
//! let camera = Camera::new().at(0.0, 0.0, 4.0).looking_at(0.0, 0.0, 0.0);
//! let mut renderer = MirrorTreeRenderer::new(MirrorConfig::new().max_depth(3))?;
//!
//! // Record the frame; a MirrorPass replays it on the GPU
//! let mut commands = CommandList::new();
//! let stats = renderer.render_frame(
//!     camera.view_matrix(),
//!     camera.projection_matrix(),
//!     camera.position,
//!     &catalog,
//!     &scene,
//!     &mut commands,
//! )?;
//! assert_eq!(stats.mirrors, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! - [`MirrorTree`] builds the camera tree, clipping each mirror against its
//!   parent's frustum with a [`Clipper`].
//! - [`Culler`] decides which [`DrawNode`]s each camera sees.
//! - [`Drawlist`] sorts them into opaque, instanced and alpha buckets.
//! - [`MirrorTreeRenderer`] walks the tree and drives a [`RenderBackend`].
//! - [`MirrorPass`] is the wgpu backend, replaying a recorded [`CommandList`].

mod aabb;
mod backend;
mod camera;
pub mod clip;
mod config;
mod cull;
mod drawlist;
mod error;
pub mod frustum;
mod gpu;
mod mesh;
mod mirror;
mod mirror_pass;
mod plane;
pub mod projection;
mod renderer;
mod scene;
mod spatial;
mod tree;

pub use aabb::{Aabb, FrustumStatus, classify_points};
pub use backend::{
    BlendMode, CommandList, DepthAccess, DepthStencilDesc, DepthStencilMode, RasterMode,
    RenderBackend, RenderCommand, StencilMode, depth_stencil_desc,
};
pub use camera::Camera;
pub use clip::{ClipPolygon, ClipStrategy, Clipper, PolygonClipper};
pub use config::MirrorConfig;
pub use cull::{Culler, VisibleSet, cull_node, is_visible_clip_space, is_visible_world_space};
pub use drawlist::{
    DrawItem, DrawSource, Drawlist, ShaderTechnique, SortKey, SortOrder, SortParams,
    make_sort_key, sort_keys,
};
pub use error::{MirrorError, Result};
pub use gpu::GpuContext;
pub use mesh::{GpuMesh, MeshData, Vertex3d};
pub use mirror::{MAX_MIRROR_VERTICES, MirrorCatalog, MirrorPolygon};
pub use mirror_pass::{DEPTH_STENCIL_FORMAT, DrawUniforms, MirrorPass};
pub use plane::{Frustum, MAX_PLANES, Plane};
pub use renderer::{DebugCapture, FrameStats, MirrorTreeRenderer};
pub use scene::{DrawMesh, DrawNode, InstancedNode, MeshHandle, Scene, SceneView};
pub use spatial::{Bvh, SpatialIndex};
pub use tree::{CameraNode, Children, MirrorTree};

// Re-export glam math types for convenience
pub use glam::{Mat4, Vec3, Vec4};
