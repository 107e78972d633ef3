//! Drives a frame through the mirror tree.
//!
//! The tree is walked in its stored depth-first order. Each mirror camera is
//! bracketed by a stencil *mark* of its mirror, drawn with the parent camera,
//! and a matching *unmark* once all of its descendants are done. Open brackets
//! live on an explicit stack, so the order can be checked on a recorded
//! [`CommandList`](crate::backend::CommandList) without a GPU.
//!
//! ```text
//! ROOT            draw root content
//! MIRROR 1        mark 1, draw 1
//!   MIRROR 2      mark 2, draw 2, unmark 2
//!                 unmark 1
//! MIRROR 3        mark 3, draw 3, unmark 3
//! ```

use glam::{Mat4, Vec3};
use log::debug;

use crate::backend::{BlendMode, DepthAccess, DepthStencilMode, RasterMode, RenderBackend};
use crate::config::MirrorConfig;
use crate::cull::{Culler, VisibleSet};
use crate::drawlist::{DrawItem, DrawSource, Drawlist};
use crate::error::Result;
use crate::mirror::MirrorCatalog;
use crate::scene::SceneView;
use crate::tree::{CameraNode, MirrorTree};

/// Counters for one rendered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Cameras drawn, the root included.
    pub cameras: usize,
    /// Mirror cameras, i.e. mark/unmark pairs.
    pub mirrors: usize,
    pub max_depth: u32,
    /// Draw nodes that passed culling, summed over all cameras.
    pub visible_nodes: usize,
    /// Scene draws issued, instanced draws included.
    pub draw_calls: usize,
}

/// Snapshot of the last frame's cameras and visibility, for tooling.
#[derive(Clone, Debug, Default)]
pub struct DebugCapture {
    pub cameras: Vec<CameraNode>,
    /// Visible draw nodes per camera, indexed like `cameras`.
    pub visible: Vec<VisibleSet>,
}

/// Renders a scene with recursive planar reflections.
///
/// Owns the per-frame tree, visibility lists and draw list. They are cleared
/// at the start of every frame and keep their allocations.
#[derive(Debug)]
pub struct MirrorTreeRenderer {
    config: MirrorConfig,
    tree: MirrorTree,
    culler: Culler,
    visible: Vec<VisibleSet>,
    drawlist: Drawlist,
    parents: Vec<usize>,
    capture: Option<DebugCapture>,
}

/// Borrowed state shared by every camera draw of a frame.
struct FramePass<'a, S: ?Sized, B: ?Sized> {
    scene: &'a S,
    backend: &'a mut B,
    culler: &'a Culler,
    drawlist: &'a mut Drawlist,
    max_distance: f32,
    stats: FrameStats,
}

impl<S: SceneView + ?Sized, B: RenderBackend + ?Sized> FramePass<'_, S, B> {
    /// Draws everything `camera` sees, limited to stencil value `stencil_ref`.
    fn draw_camera(&mut self, camera: &CameraNode, visible: &mut VisibleSet, stencil_ref: u32) {
        let mode = |depth: DepthAccess| {
            if camera.is_root() {
                DepthStencilMode::root(depth)
            } else {
                DepthStencilMode::reflection(depth)
            }
        };

        self.backend.set_camera(camera.view_proj, camera.position);

        self.backend.begin_event("SKY");
        self.backend.set_blend(BlendMode::Opaque);
        self.backend
            .set_depth_stencil(mode(DepthAccess::Overwrite), stencil_ref);
        self.backend.set_raster(RasterMode::FillFrontfaces);
        self.backend.draw_background();
        self.backend.end_event();

        self.culler.cull(camera, self.scene, visible);
        self.drawlist
            .build(visible, camera.position, self.scene, self.max_distance);
        self.stats.visible_nodes += visible.len();
        self.backend.set_raster(RasterMode::for_content(camera.depth));

        self.backend.begin_event("OPAQUE");
        self.backend
            .set_depth_stencil(mode(DepthAccess::Test), stencil_ref);
        let mut blend = None;
        for item in self.drawlist.opaque().chain(self.drawlist.instanced()) {
            if blend != Some(item.blend) {
                self.backend.set_blend(item.blend);
                blend = Some(item.blend);
            }
            submit(self.backend, self.scene, item);
            self.stats.draw_calls += 1;
        }
        self.backend.end_event();

        self.backend.begin_event("ALPHA");
        self.backend.set_blend(BlendMode::Alpha);
        self.backend
            .set_depth_stencil(mode(DepthAccess::ReadOnly), stencil_ref);
        for item in self.drawlist.alpha() {
            submit(self.backend, self.scene, item);
            self.stats.draw_calls += 1;
        }
        self.backend.end_event();
    }

    /// Raises the stencil under `node`'s mirror, as seen by `parent`.
    fn mark(&mut self, node: &CameraNode, parent: &CameraNode) {
        self.backend.begin_event("MARK MIRROR");
        self.backend.set_camera(parent.view_proj, parent.position);
        self.backend
            .set_depth_stencil(DepthStencilMode::MARK, parent.depth);
        self.backend.set_raster(RasterMode::for_mirror(node.depth));
        self.backend.set_blend(BlendMode::NoColor);
        self.backend.draw_mirror(&node.polygon, node.tint);
        self.backend.end_event();
    }

    /// Lowers the stencil back and restores the mirror's depth for `parent`.
    fn unmark(&mut self, node: &CameraNode, parent: &CameraNode) {
        self.backend.begin_event("UNMARK MIRROR");
        self.backend.set_camera(parent.view_proj, parent.position);
        self.backend
            .set_depth_stencil(DepthStencilMode::UNMARK, node.depth);
        self.backend.set_raster(RasterMode::for_mirror(node.depth));
        self.backend.set_blend(BlendMode::Alpha);
        self.backend.draw_mirror(&node.polygon, node.tint);
        self.backend.end_event();
    }
}

fn submit<S: SceneView + ?Sized, B: RenderBackend + ?Sized>(
    backend: &mut B,
    scene: &S,
    item: &DrawItem,
) {
    match item.source {
        DrawSource::Node(_) => backend.draw(item),
        DrawSource::Instanced(n) => {
            let instances: &[Mat4] = scene
                .instanced_nodes()
                .get(n)
                .map(|node| node.active_instances())
                .unwrap_or_default();
            backend.draw_instanced(item, instances);
        }
    }
}

impl MirrorTreeRenderer {
    /// Creates a renderer, validating `config`.
    pub fn new(config: MirrorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tree: MirrorTree::new(),
            culler: Culler::new(),
            visible: Vec::new(),
            drawlist: Drawlist::new(),
            parents: Vec::new(),
            capture: None,
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// The tree built by the last successful frame.
    pub fn tree(&self) -> &MirrorTree {
        &self.tree
    }

    /// Debug snapshot of the last frame, when `capture_debug` is set.
    pub fn last_capture(&self) -> Option<&DebugCapture> {
        self.capture.as_ref()
    }

    /// Renders one frame seen from the main camera.
    ///
    /// Builds the mirror tree, then draws the root view followed by every
    /// mirror camera between its stencil mark and unmark.
    ///
    /// # Errors
    ///
    /// Fails with [`MirrorError::NodeCapacityExceeded`] when the tree does not
    /// fit in `max_nodes`. Nothing is submitted to `backend` in that case.
    ///
    /// [`MirrorError::NodeCapacityExceeded`]: crate::MirrorError::NodeCapacityExceeded
    pub fn render_frame<S, B>(
        &mut self,
        view: Mat4,
        projection: Mat4,
        position: Vec3,
        catalog: &MirrorCatalog,
        scene: &S,
        backend: &mut B,
    ) -> Result<FrameStats>
    where
        S: SceneView + ?Sized,
        B: RenderBackend + ?Sized,
    {
        self.capture = None;
        self.tree
            .build(CameraNode::root(view, projection, position), catalog, &self.config)?;
        self.culler.prepare(scene);

        let nodes = self.tree.nodes();
        let count = nodes.len();
        self.visible.resize_with(count, VisibleSet::new);

        let mut pass = FramePass {
            scene,
            backend,
            culler: &self.culler,
            drawlist: &mut self.drawlist,
            max_distance: self.config.sort_max_distance,
            stats: FrameStats {
                cameras: count,
                mirrors: count.saturating_sub(1),
                max_depth: self.tree.max_depth_reached(),
                ..FrameStats::default()
            },
        };

        pass.backend.clear_stencil();
        pass.backend.begin_event("ROOT");
        pass.draw_camera(&nodes[0], &mut self.visible[0], 0);
        pass.backend.end_event();

        let parents = &mut self.parents;
        parents.clear();
        parents.push(0);
        for index in 1..count {
            let node = &nodes[index];
            let parent = &nodes[node.parent.unwrap_or(0)];

            pass.backend.begin_event(&format!("MIRROR {index}"));
            pass.mark(node, parent);
            pass.draw_camera(node, &mut self.visible[index], node.depth);
            parents.push(index);

            while parents.len() > 1 {
                let top = parents[parents.len() - 1];
                if index + 1 < nodes[top].sibling_index {
                    break;
                }
                let outer = parents[parents.len() - 2];
                pass.unmark(&nodes[top], &nodes[outer]);
                pass.backend.end_event();
                parents.pop();
            }
        }

        let stats = pass.stats;
        debug!(
            "frame: {} cameras, depth {}, {} visible nodes, {} draws",
            stats.cameras, stats.max_depth, stats.visible_nodes, stats.draw_calls
        );

        if self.config.capture_debug {
            self.capture = Some(DebugCapture {
                cameras: nodes.to_vec(),
                visible: self.visible[..count].to_vec(),
            });
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CommandList, RenderCommand, StencilMode};
    use crate::drawlist::ShaderTechnique;
    use crate::error::MirrorError;
    use crate::scene::{DrawNode, MeshHandle, Scene};

    fn square_mirror() -> MirrorCatalog {
        MirrorCatalog::from_polygons(&[[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
        ]])
        .unwrap()
    }

    fn scene() -> Scene {
        let mut scene = Scene::new();
        // in front of the mirror, and behind it
        scene.add_node(DrawNode::new(MeshHandle(0), ShaderTechnique::Color3D).at(Vec3::new(0.0, 0.0, 2.0)));
        scene.add_node(DrawNode::new(MeshHandle(1), ShaderTechnique::Color3D).at(Vec3::new(0.0, 0.0, -3.0)));
        scene
    }

    fn render(
        renderer: &mut MirrorTreeRenderer,
        catalog: &MirrorCatalog,
        backend: &mut CommandList,
    ) -> Result<FrameStats> {
        let eye = Vec3::new(0.0, 0.0, 4.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(1.2, 1.0, 0.1, 100.0);
        renderer.render_frame(view, proj, eye, catalog, &scene(), backend)
    }

    fn stencil_writes(commands: &[RenderCommand]) -> Vec<(StencilMode, u32)> {
        commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::SetDepthStencil { mode, stencil_ref }
                    if matches!(mode.stencil, StencilMode::Mark | StencilMode::Unmark) =>
                {
                    Some((mode.stencil, *stencil_ref))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_no_mirrors_draws_root_only() {
        let mut renderer = MirrorTreeRenderer::new(MirrorConfig::default()).unwrap();
        let mut commands = CommandList::new();
        let stats = render(&mut renderer, &MirrorCatalog::default(), &mut commands).unwrap();

        assert_eq!(commands.commands()[0], RenderCommand::ClearStencil);
        assert_eq!(stats.cameras, 1);
        assert_eq!(stats.mirrors, 0);
        assert_eq!(stats.visible_nodes, 2);
        assert_eq!(stats.draw_calls, 2);
        assert!(stencil_writes(commands.commands()).is_empty());
    }

    #[test]
    fn test_single_mirror_brackets_reflection() {
        let mut renderer = MirrorTreeRenderer::new(MirrorConfig::new().max_depth(1)).unwrap();
        let mut commands = CommandList::new();
        let stats = render(&mut renderer, &square_mirror(), &mut commands).unwrap();

        assert_eq!(stats.cameras, 2);
        assert_eq!(stats.max_depth, 1);
        assert_eq!(
            stencil_writes(commands.commands()),
            vec![(StencilMode::Mark, 0), (StencilMode::Unmark, 1)]
        );

        let reflection_refs: Vec<u32> = commands
            .commands()
            .iter()
            .filter_map(|c| match c {
                RenderCommand::SetDepthStencil { mode, stencil_ref }
                    if mode.stencil == StencilMode::Reflection =>
                {
                    Some(*stencil_ref)
                }
                _ => None,
            })
            .collect();
        assert_eq!(reflection_refs, vec![1, 1, 1]);

        let begins = commands
            .commands()
            .iter()
            .filter(|c| matches!(c, RenderCommand::BeginEvent(_)))
            .count();
        let ends = commands
            .commands()
            .iter()
            .filter(|c| matches!(c, RenderCommand::EndEvent))
            .count();
        assert_eq!(begins, ends);
    }

    #[test]
    fn test_reflection_culls_behind_mirror() {
        let config = MirrorConfig::new().max_depth(1).capture_debug(true);
        let mut renderer = MirrorTreeRenderer::new(config).unwrap();
        let mut commands = CommandList::new();
        render(&mut renderer, &square_mirror(), &mut commands).unwrap();

        let capture = renderer.last_capture().unwrap();
        assert_eq!(capture.cameras.len(), 2);
        assert_eq!(capture.visible[0].nodes, vec![0, 1]);
        assert_eq!(capture.visible[1].nodes, vec![0]);
    }

    #[test]
    fn test_capacity_error_submits_nothing() {
        let mut renderer = MirrorTreeRenderer::new(MirrorConfig::new().max_nodes(1)).unwrap();
        let mut commands = CommandList::new();
        let err = render(&mut renderer, &square_mirror(), &mut commands).unwrap_err();
        assert!(matches!(err, MirrorError::NodeCapacityExceeded { capacity: 1 }));
        assert!(commands.is_empty());
        assert!(renderer.last_capture().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(MirrorTreeRenderer::new(MirrorConfig::new().max_depth(0)).is_err());
    }
}
