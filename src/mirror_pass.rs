//! Replays a recorded frame on the GPU.
//!
//! [`MirrorPass`] turns a [`CommandList`] produced by
//! [`MirrorTreeRenderer::render_frame`](crate::MirrorTreeRenderer::render_frame)
//! into wgpu draws. Replay happens in two steps because a render pass cannot
//! create resources:
//!
//! 1. [`prepare`](MirrorPass::prepare) walks the commands once, creates any
//!    pipeline state not seen before, and uploads per-draw uniforms, instance
//!    transforms and mirror polygons.
//! 2. [`replay`](MirrorPass::replay) walks them again inside a render pass
//!    started by [`begin`](MirrorPass::begin) and issues the draws.
//!
//! # Architecture
//!
//! - One bind group (group 0) over a uniform buffer with one 256-byte aligned
//!   [`DrawUniforms`] slot per draw, selected with a dynamic offset.
//! - Pipelines are cached by kind plus (depth-stencil mode, raster mode,
//!   blend). A frame uses a few dozen at most.
//! - Mirror polygons are uploaded as triangle fans into one vertex buffer.
//! - The depth target is `Depth24PlusStencil8`. [`begin`](MirrorPass::begin)
//!   clears depth to 1 and stencil to 0, which is where the recorded
//!   `ClearStencil` takes effect.
//!
//! # Example
//!
//! ```ignore
//! let mut commands = CommandList::new();
//! renderer.render_frame(view, proj, eye, &catalog, &scene, &mut commands)?;
//!
//! mirror_pass.ensure_depth_size(&gpu);
//! mirror_pass.prepare(&gpu, &commands);
//! let mut encoder = gpu.device.create_command_encoder(&Default::default());
//! {
//!     let mut pass = mirror_pass.begin(&mut encoder, &surface_view);
//!     mirror_pass.replay(&mut pass, &commands, &meshes);
//! }
//! gpu.queue.submit(Some(encoder.finish()));
//! ```

use std::collections::HashMap;
use std::num::NonZeroU64;

use glam::{Mat4, Vec3, Vec4};
use log::{debug, warn};

use crate::backend::{
    depth_stencil_desc, BlendMode, CommandList, DepthAccess, DepthStencilMode, RasterMode,
    RenderCommand,
};
use crate::clip::ClipPolygon;
use crate::drawlist::DrawItem;
use crate::gpu::GpuContext;
use crate::mesh::{GpuMesh, Vertex3d};

/// Depth-stencil format of the pass.
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Per-draw uniforms, one dynamic-offset slot each.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    /// Camera view-projection (world to clip space).
    pub view_proj: [[f32; 4]; 4],
    /// Model matrix. Identity for instanced, mirror and background draws.
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub camera_pos: [f32; 3],
    pub _pad: f32,
}

const UNIFORM_SIZE: u64 = std::mem::size_of::<DrawUniforms>() as u64;
const INSTANCE_SIZE: u64 = std::mem::size_of::<[[f32; 4]; 4]>() as u64;
const MIRROR_VERTEX_SIZE: u64 = std::mem::size_of::<[f32; 3]>() as u64;

/// Rounds `size` up to a multiple of `alignment`.
fn aligned_stride(size: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    size.div_ceil(alignment) * alignment
}

/// Vertex count of `polygon` as a triangle list fanned from its first vertex.
fn fan_vertex_count(polygon: &ClipPolygon) -> u32 {
    polygon.len().saturating_sub(2) as u32 * 3
}

/// Appends `polygon` as a triangle list. Keeps the polygon's winding.
fn push_fan(polygon: &ClipPolygon, out: &mut Vec<[f32; 3]>) {
    let v = polygon.as_slice();
    for i in 1..v.len().saturating_sub(1) {
        out.extend([v[0], v[i], v[i + 1]].map(|p| p.to_array()));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum PipelineKind {
    Mesh,
    Instanced,
    Mirror,
    Background,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    kind: PipelineKind,
    depth_stencil: DepthStencilMode,
    raster: RasterMode,
    blend: BlendMode,
}

/// Fixed-function state as the command stream sets it.
#[derive(Clone, Copy, Debug)]
struct ReplayState {
    raster: RasterMode,
    depth_stencil: DepthStencilMode,
    blend: BlendMode,
    view_proj: Mat4,
    camera_pos: Vec3,
}

impl Default for ReplayState {
    fn default() -> Self {
        Self {
            raster: RasterMode::FillFrontfaces,
            depth_stencil: DepthStencilMode::root(DepthAccess::Test),
            blend: BlendMode::Opaque,
            view_proj: Mat4::IDENTITY,
            camera_pos: Vec3::ZERO,
        }
    }
}

impl ReplayState {
    fn apply(&mut self, command: &RenderCommand) {
        match command {
            RenderCommand::SetRaster(mode) => self.raster = *mode,
            RenderCommand::SetDepthStencil { mode, .. } => self.depth_stencil = *mode,
            RenderCommand::SetBlend(mode) => self.blend = *mode,
            RenderCommand::SetCamera {
                view_proj,
                position,
            } => {
                self.view_proj = *view_proj;
                self.camera_pos = *position;
            }
            _ => {}
        }
    }

    fn key(&self, kind: PipelineKind) -> PipelineKey {
        PipelineKey {
            kind,
            depth_stencil: self.depth_stencil,
            raster: self.raster,
            blend: self.blend,
        }
    }

    fn uniforms(&self, model: Mat4, color: Vec4) -> DrawUniforms {
        DrawUniforms {
            view_proj: self.view_proj.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            color: color.to_array(),
            camera_pos: self.camera_pos.to_array(),
            _pad: 0.0,
        }
    }
}

/// A growable GPU buffer.
struct DynamicBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
    usage: wgpu::BufferUsages,
    label: &'static str,
}

impl DynamicBuffer {
    fn new(device: &wgpu::Device, label: &'static str, capacity: u64, usage: wgpu::BufferUsages) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        Self {
            buffer: Self::create(device, label, capacity, usage),
            capacity,
            usage,
            label,
        }
    }

    fn create(device: &wgpu::Device, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Uploads `bytes`, growing the buffer first if needed. Returns true when
    /// the buffer was replaced.
    fn upload(&mut self, gpu: &GpuContext, bytes: &[u8]) -> bool {
        let needed = bytes.len() as u64;
        let mut grew = false;
        if needed > self.capacity {
            self.capacity = needed.next_power_of_two();
            self.buffer = Self::create(&gpu.device, self.label, self.capacity, self.usage);
            debug!("{} grew to {} bytes", self.label, self.capacity);
            grew = true;
        }
        if !bytes.is_empty() {
            gpu.queue.write_buffer(&self.buffer, 0, bytes);
        }
        grew
    }
}

/// GPU backend for recorded mirror frames.
///
/// Culls clockwise back faces according to the recorded [`RasterMode`],
/// restricts every draw with the recorded stencil state, and shades scene
/// meshes with a flat lit color. All shader techniques share that shading.
pub struct MirrorPass {
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    color_format: wgpu::TextureFormat,
    uniform_stride: u64,
    uniforms: DynamicBuffer,
    instances: DynamicBuffer,
    mirror_vertices: DynamicBuffer,
    uniform_bytes: Vec<u8>,
    instance_data: Vec<[[f32; 4]; 4]>,
    fan_data: Vec<[f32; 3]>,
    /// Depth-stencil target, resized by [`ensure_depth_size`](Self::ensure_depth_size).
    pub depth_texture: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    depth_size: (u32, u32),
    /// Color of the background draw.
    pub background: Vec4,
}

impl MirrorPass {
    /// Creates the pass for the surface format of `gpu`.
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mirror Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mirror.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(UNIFORM_SIZE),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mirror Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_stride = aligned_stride(UNIFORM_SIZE, alignment);

        let uniforms = DynamicBuffer::new(
            device,
            "Draw Uniforms",
            uniform_stride * 64,
            wgpu::BufferUsages::UNIFORM,
        );
        let instances = DynamicBuffer::new(
            device,
            "Instance Transforms",
            INSTANCE_SIZE * 64,
            wgpu::BufferUsages::VERTEX,
        );
        let mirror_vertices = DynamicBuffer::new(
            device,
            "Mirror Polygons",
            MIRROR_VERTEX_SIZE * 3 * 64,
            wgpu::BufferUsages::VERTEX,
        );
        let bind_group = Self::create_bind_group(device, &bind_group_layout, &uniforms.buffer);
        let (depth_texture, depth_view) = Self::create_depth_texture(gpu);

        Self {
            shader,
            pipeline_layout,
            bind_group_layout,
            bind_group,
            pipelines: HashMap::new(),
            color_format: gpu.config.format,
            uniform_stride,
            uniforms,
            instances,
            mirror_vertices,
            uniform_bytes: Vec::new(),
            instance_data: Vec::new(),
            fan_data: Vec::new(),
            depth_texture,
            depth_view,
            depth_size: (gpu.width(), gpu.height()),
            background: Vec4::new(0.05, 0.06, 0.09, 1.0),
        }
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: NonZeroU64::new(UNIFORM_SIZE),
                }),
            }],
        })
    }

    fn create_depth_texture(gpu: &GpuContext) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Mirror Depth Stencil"),
            size: wgpu::Extent3d {
                width: gpu.width(),
                height: gpu.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    /// Recreates the depth-stencil target if the surface was resized.
    pub fn ensure_depth_size(&mut self, gpu: &GpuContext) {
        if self.depth_size != (gpu.width(), gpu.height()) {
            let (texture, view) = Self::create_depth_texture(gpu);
            self.depth_texture = texture;
            self.depth_view = view;
            self.depth_size = (gpu.width(), gpu.height());
        }
    }

    /// Number of pipeline states created so far.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn create_pipeline(&self, device: &wgpu::Device, key: PipelineKey) -> wgpu::RenderPipeline {
        const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 4] =
            wgpu::vertex_attr_array![3 => Float32x4, 4 => Float32x4, 5 => Float32x4, 6 => Float32x4];
        const MIRROR_ATTRIBUTES: [wgpu::VertexAttribute; 1] =
            wgpu::vertex_attr_array![0 => Float32x3];

        let instance_layout = wgpu::VertexBufferLayout {
            array_stride: INSTANCE_SIZE,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &INSTANCE_ATTRIBUTES,
        };
        let mirror_layout = wgpu::VertexBufferLayout {
            array_stride: MIRROR_VERTEX_SIZE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &MIRROR_ATTRIBUTES,
        };

        let (entry_point, buffers, cull_mode): (&str, Vec<wgpu::VertexBufferLayout>, _) = match key.kind {
            PipelineKind::Mesh => ("vs_mesh", vec![Vertex3d::LAYOUT], Some(key.raster.cull_face())),
            PipelineKind::Instanced => (
                "vs_instanced",
                vec![Vertex3d::LAYOUT, instance_layout],
                Some(key.raster.cull_face()),
            ),
            PipelineKind::Mirror => ("vs_mirror", vec![mirror_layout], Some(key.raster.cull_face())),
            PipelineKind::Background => ("vs_background", Vec::new(), None),
        };

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mirror Pass Pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some(entry_point),
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend: key.blend.blend_state(),
                    write_mask: key.blend.write_mask(),
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode,
                front_face: wgpu::FrontFace::Cw,
                ..Default::default()
            },
            depth_stencil: Some(depth_stencil_desc(key.depth_stencil).to_wgpu(DEPTH_STENCIL_FORMAT)),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    fn ensure_pipeline(&mut self, device: &wgpu::Device, key: PipelineKey) {
        if !self.pipelines.contains_key(&key) {
            let pipeline = self.create_pipeline(device, key);
            self.pipelines.insert(key, pipeline);
        }
    }

    /// Creates missing pipelines and uploads the per-draw data of `commands`.
    ///
    /// Must be called with the same command list that is then replayed.
    pub fn prepare(&mut self, gpu: &GpuContext, commands: &CommandList) {
        self.uniform_bytes.clear();
        self.instance_data.clear();
        self.fan_data.clear();

        let mut state = ReplayState::default();
        for command in commands.commands() {
            state.apply(command);
            let (kind, uniforms) = match command {
                RenderCommand::DrawBackground => (
                    PipelineKind::Background,
                    state.uniforms(Mat4::IDENTITY, self.background),
                ),
                RenderCommand::Draw(item) => {
                    (PipelineKind::Mesh, state.uniforms(item.world, item.color))
                }
                RenderCommand::DrawInstanced { item, instances } => {
                    self.instance_data
                        .extend(instances.iter().map(|m| m.to_cols_array_2d()));
                    (
                        PipelineKind::Instanced,
                        state.uniforms(Mat4::IDENTITY, item.color),
                    )
                }
                RenderCommand::DrawMirror { polygon, tint } => {
                    push_fan(polygon, &mut self.fan_data);
                    (PipelineKind::Mirror, state.uniforms(Mat4::IDENTITY, *tint))
                }
                _ => continue,
            };
            self.ensure_pipeline(&gpu.device, state.key(kind));

            let start = self.uniform_bytes.len();
            self.uniform_bytes.extend_from_slice(bytemuck::bytes_of(&uniforms));
            self.uniform_bytes
                .resize(start + self.uniform_stride as usize, 0);
        }

        if self.uniforms.upload(gpu, &self.uniform_bytes) {
            self.bind_group =
                Self::create_bind_group(&gpu.device, &self.bind_group_layout, &self.uniforms.buffer);
        }
        self.instances
            .upload(gpu, bytemuck::cast_slice(&self.instance_data));
        self.mirror_vertices
            .upload(gpu, bytemuck::cast_slice(&self.fan_data));
    }

    /// Starts a render pass on `target` that clears color, depth and stencil.
    pub fn begin<'a>(
        &self,
        encoder: &'a mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) -> wgpu::RenderPass<'a> {
        let [r, g, b, a] = self.background.to_array().map(f64::from);
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Mirror Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    /// Issues the draws of `commands` into `pass`.
    ///
    /// `meshes` is indexed by [`MeshHandle`](crate::MeshHandle). Draws that
    /// name a missing mesh are skipped.
    pub fn replay(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        commands: &CommandList,
        meshes: &[GpuMesh],
    ) {
        let mut state = ReplayState::default();
        let mut bound: Option<PipelineKey> = None;
        let mut slot: u64 = 0;
        let mut instance: u32 = 0;
        let mut fan_vertex: u32 = 0;

        for command in commands.commands() {
            state.apply(command);
            let kind = match command {
                RenderCommand::BeginEvent(label) => {
                    pass.push_debug_group(label);
                    continue;
                }
                RenderCommand::EndEvent => {
                    pass.pop_debug_group();
                    continue;
                }
                RenderCommand::SetDepthStencil { stencil_ref, .. } => {
                    pass.set_stencil_reference(*stencil_ref);
                    continue;
                }
                RenderCommand::DrawBackground => PipelineKind::Background,
                RenderCommand::Draw(_) => PipelineKind::Mesh,
                RenderCommand::DrawInstanced { .. } => PipelineKind::Instanced,
                RenderCommand::DrawMirror { .. } => PipelineKind::Mirror,
                _ => continue,
            };

            let offset = (slot * self.uniform_stride) as u32;
            slot += 1;
            let (first_instance, first_fan_vertex) = (instance, fan_vertex);
            match command {
                RenderCommand::DrawInstanced { instances, .. } => instance += instances.len() as u32,
                RenderCommand::DrawMirror { polygon, .. } => fan_vertex += fan_vertex_count(polygon),
                _ => {}
            }

            let key = state.key(kind);
            if bound != Some(key) {
                let Some(pipeline) = self.pipelines.get(&key) else {
                    warn!("no pipeline for {key:?}, was prepare skipped?");
                    continue;
                };
                pass.set_pipeline(pipeline);
                bound = Some(key);
            }
            pass.set_bind_group(0, &self.bind_group, &[offset]);

            match command {
                RenderCommand::DrawBackground => pass.draw(0..3, 0..1),
                RenderCommand::Draw(item) => {
                    if let Some(mesh) = mesh_for(meshes, item) {
                        bind_mesh(pass, mesh);
                        pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                    }
                }
                RenderCommand::DrawInstanced { item, .. } => {
                    let count = instance - first_instance;
                    if let (Some(mesh), true) = (mesh_for(meshes, item), count > 0) {
                        let start = u64::from(first_instance) * INSTANCE_SIZE;
                        let end = u64::from(instance) * INSTANCE_SIZE;
                        bind_mesh(pass, mesh);
                        pass.set_vertex_buffer(1, self.instances.buffer.slice(start..end));
                        pass.draw_indexed(0..mesh.index_count, 0, 0..count);
                    }
                }
                RenderCommand::DrawMirror { .. } => {
                    if fan_vertex > first_fan_vertex {
                        pass.set_vertex_buffer(0, self.mirror_vertices.buffer.slice(..));
                        pass.draw(first_fan_vertex..fan_vertex, 0..1);
                    }
                }
                _ => {}
            }
        }
    }
}

fn mesh_for<'m>(meshes: &'m [GpuMesh], item: &DrawItem) -> Option<&'m GpuMesh> {
    meshes.get(item.mesh.0)
}

fn bind_mesh(pass: &mut wgpu::RenderPass<'_>, mesh: &GpuMesh) {
    pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
    pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
}
