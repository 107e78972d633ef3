//! The drawing contract between the mirror renderer and a GPU backend.
//!
//! The renderer never talks to a graphics API directly. It drives a
//! [`RenderBackend`], setting fixed pipeline states from small tables and
//! issuing draws. [`CommandList`] records those calls so a frame can be
//! inspected in tests or replayed later on the GPU.
//!
//! # Stencil states
//!
//! | Mode | Stencil compare | Pass op | Write mask | Reference |
//! |---|---|---|---|---|
//! | [`StencilMode::Root`] | Always | Keep | 0 | 0 |
//! | [`StencilMode::Mark`] | Equal | IncrementClamp | 0xff | parent depth |
//! | [`StencilMode::Reflection`] | Equal | Keep | 0 | node depth |
//! | [`StencilMode::Unmark`] | Equal | DecrementClamp | 0xff | node depth |
//!
//! Depth is controlled separately by [`DepthAccess`]. Marking tests depth so
//! hidden parts of a mirror stay unmarked; unmarking always writes the
//! mirror's depth back so the parent sees it as an occluder.

use glam::{Mat4, Vec3, Vec4};

use crate::clip::ClipPolygon;
use crate::drawlist::DrawItem;

/// Which faces the rasterizer fills.
///
/// Each reflection flips triangle winding on screen, so the face to cull
/// alternates with reflection depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RasterMode {
    /// Fill front faces, cull back faces.
    FillFrontfaces,
    /// Fill back faces, cull front faces.
    FillBackfaces,
}

impl RasterMode {
    /// Raster mode for scene content seen by a camera at `depth`.
    pub fn for_content(depth: u32) -> Self {
        if depth % 2 == 0 {
            Self::FillFrontfaces
        } else {
            Self::FillBackfaces
        }
    }

    /// Raster mode for marking or unmarking the mirror of a node at `depth`,
    /// drawn with its parent's camera.
    pub fn for_mirror(depth: u32) -> Self {
        if depth % 2 == 1 {
            Self::FillFrontfaces
        } else {
            Self::FillBackfaces
        }
    }

    pub fn cull_face(self) -> wgpu::Face {
        match self {
            Self::FillFrontfaces => wgpu::Face::Back,
            Self::FillBackfaces => wgpu::Face::Front,
        }
    }
}

/// Color output of a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Replace the target color.
    Opaque,
    /// Blend by source alpha.
    Alpha,
    /// Write depth and stencil only.
    NoColor,
}

impl BlendMode {
    pub fn blend_state(self) -> Option<wgpu::BlendState> {
        match self {
            Self::Opaque | Self::NoColor => None,
            Self::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        }
    }

    pub fn write_mask(self) -> wgpu::ColorWrites {
        match self {
            Self::NoColor => wgpu::ColorWrites::empty(),
            Self::Opaque | Self::Alpha => wgpu::ColorWrites::ALL,
        }
    }
}

/// The four fixed stencil configurations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilMode {
    Root,
    Mark,
    Reflection,
    Unmark,
}

/// How a draw uses the depth buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthAccess {
    /// Test `Less` and write. Opaque content.
    Test,
    /// Test `Less` without writing. Transparent content.
    ReadOnly,
    /// Always pass and write. Background clears and unmarking.
    Overwrite,
}

/// A stencil configuration combined with a depth access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilMode {
    pub stencil: StencilMode,
    pub depth: DepthAccess,
}

impl DepthStencilMode {
    pub const MARK: Self = Self {
        stencil: StencilMode::Mark,
        depth: DepthAccess::Test,
    };

    pub const UNMARK: Self = Self {
        stencil: StencilMode::Unmark,
        depth: DepthAccess::Overwrite,
    };

    pub fn root(depth: DepthAccess) -> Self {
        Self {
            stencil: StencilMode::Root,
            depth,
        }
    }

    pub fn reflection(depth: DepthAccess) -> Self {
        Self {
            stencil: StencilMode::Reflection,
            depth,
        }
    }

    /// Every mode a frame can use.
    pub fn all() -> [Self; 8] {
        use DepthAccess::*;
        [
            Self::root(Overwrite),
            Self::root(Test),
            Self::root(ReadOnly),
            Self::MARK,
            Self::reflection(Overwrite),
            Self::reflection(Test),
            Self::reflection(ReadOnly),
            Self::UNMARK,
        ]
    }
}

/// Compare functions and operations of a [`DepthStencilMode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub depth_compare: wgpu::CompareFunction,
    pub depth_write: bool,
    pub stencil_compare: wgpu::CompareFunction,
    pub stencil_pass: wgpu::StencilOperation,
    pub stencil_write_mask: u32,
}

/// Looks up the fixed description of `mode`.
pub fn depth_stencil_desc(mode: DepthStencilMode) -> DepthStencilDesc {
    use wgpu::{CompareFunction, StencilOperation};

    let (depth_compare, depth_write) = match mode.depth {
        DepthAccess::Test => (CompareFunction::Less, true),
        DepthAccess::ReadOnly => (CompareFunction::Less, false),
        DepthAccess::Overwrite => (CompareFunction::Always, true),
    };
    let (stencil_compare, stencil_pass, stencil_write_mask) = match mode.stencil {
        StencilMode::Root => (CompareFunction::Always, StencilOperation::Keep, 0),
        StencilMode::Mark => (CompareFunction::Equal, StencilOperation::IncrementClamp, 0xff),
        StencilMode::Reflection => (CompareFunction::Equal, StencilOperation::Keep, 0),
        StencilMode::Unmark => (CompareFunction::Equal, StencilOperation::DecrementClamp, 0xff),
    };
    DepthStencilDesc {
        depth_compare,
        depth_write,
        stencil_compare,
        stencil_pass,
        stencil_write_mask,
    }
}

impl DepthStencilDesc {
    pub fn to_wgpu(&self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        let face = wgpu::StencilFaceState {
            compare: self.stencil_compare,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: self.stencil_pass,
        };
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: self.depth_write,
            depth_compare: self.depth_compare,
            stencil: wgpu::StencilState {
                front: face,
                back: face,
                read_mask: 0xff,
                write_mask: self.stencil_write_mask,
            },
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

/// Receives the draw stream of a frame.
pub trait RenderBackend {
    /// Resets the whole stencil buffer to zero.
    fn clear_stencil(&mut self);
    fn begin_event(&mut self, label: &str);
    fn end_event(&mut self);
    fn set_raster(&mut self, mode: RasterMode);
    fn set_depth_stencil(&mut self, mode: DepthStencilMode, stencil_ref: u32);
    fn set_blend(&mut self, mode: BlendMode);
    /// Binds the camera used by the following draws.
    fn set_camera(&mut self, view_proj: Mat4, position: Vec3);
    /// Fills the screen with the background at the far plane.
    fn draw_background(&mut self);
    fn draw(&mut self, item: &DrawItem);
    fn draw_instanced(&mut self, item: &DrawItem, instances: &[Mat4]);
    /// Draws a convex world-space mirror polygon in `tint`.
    fn draw_mirror(&mut self, polygon: &ClipPolygon, tint: Vec4);
}

/// One recorded [`RenderBackend`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderCommand {
    ClearStencil,
    BeginEvent(String),
    EndEvent,
    SetRaster(RasterMode),
    SetDepthStencil {
        mode: DepthStencilMode,
        stencil_ref: u32,
    },
    SetBlend(BlendMode),
    SetCamera {
        view_proj: Mat4,
        position: Vec3,
    },
    DrawBackground,
    Draw(DrawItem),
    DrawInstanced {
        item: DrawItem,
        instances: Vec<Mat4>,
    },
    DrawMirror {
        polygon: ClipPolygon,
        tint: Vec4,
    },
}

/// A backend that records every call.
#[derive(Clone, Debug, Default)]
pub struct CommandList {
    commands: Vec<RenderCommand>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Number of scene draws, instanced draws included.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::Draw(_) | RenderCommand::DrawInstanced { .. }))
            .count()
    }

    /// Replays the recorded calls into another backend.
    pub fn replay<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        for command in &self.commands {
            match command {
                RenderCommand::ClearStencil => backend.clear_stencil(),
                RenderCommand::BeginEvent(label) => backend.begin_event(label),
                RenderCommand::EndEvent => backend.end_event(),
                RenderCommand::SetRaster(mode) => backend.set_raster(*mode),
                RenderCommand::SetDepthStencil { mode, stencil_ref } => {
                    backend.set_depth_stencil(*mode, *stencil_ref)
                }
                RenderCommand::SetBlend(mode) => backend.set_blend(*mode),
                RenderCommand::SetCamera {
                    view_proj,
                    position,
                } => backend.set_camera(*view_proj, *position),
                RenderCommand::DrawBackground => backend.draw_background(),
                RenderCommand::Draw(item) => backend.draw(item),
                RenderCommand::DrawInstanced { item, instances } => {
                    backend.draw_instanced(item, instances)
                }
                RenderCommand::DrawMirror { polygon, tint } => backend.draw_mirror(polygon, *tint),
            }
        }
    }
}

impl RenderBackend for CommandList {
    fn clear_stencil(&mut self) {
        self.commands.push(RenderCommand::ClearStencil);
    }

    fn begin_event(&mut self, label: &str) {
        self.commands.push(RenderCommand::BeginEvent(label.to_string()));
    }

    fn end_event(&mut self) {
        self.commands.push(RenderCommand::EndEvent);
    }

    fn set_raster(&mut self, mode: RasterMode) {
        self.commands.push(RenderCommand::SetRaster(mode));
    }

    fn set_depth_stencil(&mut self, mode: DepthStencilMode, stencil_ref: u32) {
        self.commands
            .push(RenderCommand::SetDepthStencil { mode, stencil_ref });
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.commands.push(RenderCommand::SetBlend(mode));
    }

    fn set_camera(&mut self, view_proj: Mat4, position: Vec3) {
        self.commands.push(RenderCommand::SetCamera {
            view_proj,
            position,
        });
    }

    fn draw_background(&mut self) {
        self.commands.push(RenderCommand::DrawBackground);
    }

    fn draw(&mut self, item: &DrawItem) {
        self.commands.push(RenderCommand::Draw(*item));
    }

    fn draw_instanced(&mut self, item: &DrawItem, instances: &[Mat4]) {
        self.commands.push(RenderCommand::DrawInstanced {
            item: *item,
            instances: instances.to_vec(),
        });
    }

    fn draw_mirror(&mut self, polygon: &ClipPolygon, tint: Vec4) {
        self.commands.push(RenderCommand::DrawMirror {
            polygon: *polygon,
            tint,
        });
    }
}
