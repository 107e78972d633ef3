mod common;

use speculum::{
    BlendMode, ClipPolygon, CommandList, DepthAccess, DepthStencilMode, DrawItem, DrawNode, InstancedNode,
    Mat4, MeshHandle, MirrorCatalog, MirrorConfig, MirrorTreeRenderer, RasterMode,
    RenderBackend, RenderCommand, Scene, ShaderTechnique, StencilMode, Vec3, Vec4,
    depth_stencil_desc,
};
use wgpu::{CompareFunction, StencilOperation};

use common::{facing_pair, facing_pair_eye, init_logging, mirror_room, perspective};

const GRID: usize = 64;

/// Software stencil buffer that rasterizes mirror polygons at cell centers.
///
/// Depth is ignored, so every covered cell passes the depth test.
struct StencilGrid {
    stencil: Vec<u8>,
    view_proj: Mat4,
    mode: DepthStencilMode,
    stencil_ref: u32,
    /// Depth of each currently marked mirror, innermost last.
    open_marks: Vec<u32>,
    events: Vec<String>,
    /// Cells changed by each mark, in draw order.
    mark_coverage: Vec<usize>,
    max_stencil: u8,
    scene_draws: usize,
}

impl StencilGrid {
    fn new() -> Self {
        Self {
            stencil: vec![0; GRID * GRID],
            view_proj: Mat4::IDENTITY,
            mode: DepthStencilMode::root(DepthAccess::Test),
            stencil_ref: 0,
            open_marks: Vec::new(),
            events: Vec::new(),
            mark_coverage: Vec::new(),
            max_stencil: 0,
            scene_draws: 0,
        }
    }

    /// Screen-space positions of `polygon`, or `None` if a vertex is behind
    /// the eye.
    fn project(&self, polygon: &ClipPolygon) -> Option<Vec<(f32, f32)>> {
        polygon
            .iter()
            .map(|v| {
                let clip = self.view_proj * v.extend(1.0);
                (clip.w > 1e-6).then(|| (clip.x / clip.w, clip.y / clip.w))
            })
            .collect()
    }

    fn covers(points: &[(f32, f32)], x: f32, y: f32) -> bool {
        let mut positive = false;
        let mut negative = false;
        for (i, a) in points.iter().enumerate() {
            let b = points[(i + 1) % points.len()];
            let cross = (b.0 - a.0) * (y - a.1) - (b.1 - a.1) * (x - a.0);
            positive |= cross > 0.0;
            negative |= cross < 0.0;
        }
        !(positive && negative)
    }

    /// Runs the stencil test and pass op of the bound mode over every
    /// covered cell. Returns the number of cells written.
    fn rasterize(&mut self, polygon: &ClipPolygon) -> usize {
        let desc = depth_stencil_desc(self.mode);
        let Some(points) = self.project(polygon) else {
            return 0;
        };

        let mut written = 0;
        for row in 0..GRID {
            for col in 0..GRID {
                let x = (col as f32 + 0.5) / GRID as f32 * 2.0 - 1.0;
                let y = (row as f32 + 0.5) / GRID as f32 * 2.0 - 1.0;
                if !Self::covers(&points, x, y) {
                    continue;
                }
                let cell = &mut self.stencil[row * GRID + col];
                let passes = match desc.stencil_compare {
                    CompareFunction::Always => true,
                    CompareFunction::Equal => u32::from(*cell) == self.stencil_ref,
                    other => panic!("unexpected stencil compare {other:?}"),
                };
                if !passes || desc.stencil_write_mask == 0 {
                    continue;
                }
                match desc.stencil_pass {
                    StencilOperation::Keep => continue,
                    StencilOperation::IncrementClamp => *cell = cell.saturating_add(1),
                    StencilOperation::DecrementClamp => {
                        assert!(*cell > 0, "stencil would underflow");
                        *cell -= 1;
                    }
                    other => panic!("unexpected stencil op {other:?}"),
                }
                written += 1;
                self.max_stencil = self.max_stencil.max(*cell);
            }
        }
        written
    }

    /// Scene draws must test against the innermost open mark.
    fn check_scene_state(&mut self) {
        self.scene_draws += 1;
        let depth = self.open_marks.last().copied().unwrap_or(0);
        assert_eq!(self.stencil_ref, depth);
        let expected = if depth == 0 {
            StencilMode::Root
        } else {
            StencilMode::Reflection
        };
        assert_eq!(self.mode.stencil, expected);
    }
}

impl RenderBackend for StencilGrid {
    fn clear_stencil(&mut self) {
        self.stencil.fill(0);
    }

    fn begin_event(&mut self, label: &str) {
        self.events.push(label.to_owned());
    }

    fn end_event(&mut self) {
        assert!(self.events.pop().is_some(), "unbalanced end_event");
    }

    fn set_raster(&mut self, _mode: RasterMode) {}

    fn set_depth_stencil(&mut self, mode: DepthStencilMode, stencil_ref: u32) {
        self.mode = mode;
        self.stencil_ref = stencil_ref;
    }

    fn set_blend(&mut self, _mode: BlendMode) {}

    fn set_camera(&mut self, view_proj: Mat4, _position: Vec3) {
        self.view_proj = view_proj;
    }

    fn draw_background(&mut self) {
        self.check_scene_state();
    }

    fn draw(&mut self, _item: &DrawItem) {
        self.check_scene_state();
    }

    fn draw_instanced(&mut self, _item: &DrawItem, _instances: &[Mat4]) {
        self.check_scene_state();
    }

    fn draw_mirror(&mut self, polygon: &ClipPolygon, _tint: Vec4) {
        match self.mode.stencil {
            StencilMode::Mark => {
                let parent = self.open_marks.last().copied().unwrap_or(0);
                assert_eq!(self.stencil_ref, parent);
                let written = self.rasterize(polygon);
                self.mark_coverage.push(written);
                self.open_marks.push(parent + 1);
            }
            StencilMode::Unmark => {
                let depth = self.open_marks.pop().expect("unmark without mark");
                assert_eq!(self.stencil_ref, depth);
                self.rasterize(polygon);
            }
            other => panic!("mirror drawn with {other:?}"),
        }
    }
}

fn scene() -> Scene {
    let mut scene = Scene::new();
    scene.add_node(
        DrawNode::new(MeshHandle(0), ShaderTechnique::Color3D).at(Vec3::new(0.0, -0.5, 0.5)),
    );
    scene.add_node(
        DrawNode::new(MeshHandle(0), ShaderTechnique::Color3D)
            .at(Vec3::new(1.0, 0.5, -0.5))
            .color(Vec4::new(0.2, 0.4, 0.9, 0.5)),
    );
    scene.add_instanced(InstancedNode::new(
        MeshHandle(0),
        vec![Mat4::from_translation(Vec3::new(-0.5, 0.0, 1.0))],
    ));
    scene
}

fn render(catalog: &MirrorCatalog, eye: Vec3, target: Vec3, max_depth: u32) -> CommandList {
    init_logging();
    let mut renderer =
        MirrorTreeRenderer::new(MirrorConfig::new().max_depth(max_depth)).unwrap();
    let mut commands = CommandList::new();
    renderer
        .render_frame(
            Mat4::look_at_rh(eye, target, Vec3::Y),
            perspective(),
            eye,
            catalog,
            &scene(),
            &mut commands,
        )
        .unwrap();
    commands
}

#[test]
fn test_facing_pair_stencil_returns_to_zero() {
    let root = facing_pair_eye();
    let commands = render(
        &facing_pair(),
        root.position,
        root.position + Vec3::NEG_Z,
        5,
    );

    let mut grid = StencilGrid::new();
    commands.replay(&mut grid);

    assert!(grid.events.is_empty());
    assert!(grid.open_marks.is_empty());
    assert!(grid.stencil.iter().all(|&s| s == 0));
    assert_eq!(grid.mark_coverage.len(), 5);
    assert!(grid.mark_coverage.iter().all(|&cells| cells > 0));
    // each reflection is seen through the previous one
    assert!(grid.mark_coverage.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(grid.max_stencil, 5);
    assert!(grid.scene_draws > 6);
}

#[test]
fn test_mirror_room_stencil_returns_to_zero() {
    let commands = render(
        &mirror_room().with_bvh(),
        Vec3::new(0.4, 0.2, 0.7),
        Vec3::new(-2.0, 0.0, -1.5),
        3,
    );

    let mut grid = StencilGrid::new();
    commands.replay(&mut grid);

    assert!(grid.events.is_empty());
    assert!(grid.open_marks.is_empty());
    assert!(grid.stencil.iter().all(|&s| s == 0));
    assert!(!grid.mark_coverage.is_empty());
    assert!(grid.max_stencil <= 3);
}

#[test]
fn test_marks_and_unmarks_pair_like_brackets() {
    let commands = render(
        &mirror_room(),
        Vec3::new(0.4, 0.2, 0.7),
        Vec3::new(-2.0, 0.0, -1.5),
        3,
    );

    let mut open: Vec<ClipPolygon> = Vec::new();
    let mut mode = None;
    let mut pairs = 0;
    for command in commands.commands() {
        match command {
            RenderCommand::SetDepthStencil { mode: m, .. } => mode = Some(m.stencil),
            RenderCommand::DrawMirror { polygon, .. } => match mode {
                Some(StencilMode::Mark) => open.push(*polygon),
                Some(StencilMode::Unmark) => {
                    assert_eq!(open.pop(), Some(*polygon));
                    pairs += 1;
                }
                other => panic!("mirror drawn with {other:?}"),
            },
            _ => {}
        }
    }
    assert!(open.is_empty());
    assert!(pairs > 0);
}

#[test]
fn test_no_mirrors_draws_root_only() {
    let catalog = MirrorCatalog::new(Vec::new());
    let commands = render(&catalog, Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO, 3);

    let mut grid = StencilGrid::new();
    commands.replay(&mut grid);
    assert!(grid.mark_coverage.is_empty());
    assert!(grid.scene_draws >= 1);
    assert!(
        !commands
            .commands()
            .iter()
            .any(|c| matches!(c, RenderCommand::DrawMirror { .. }))
    );
}
