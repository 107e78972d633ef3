//! GPU mesh geometry for the mirror pass.
//!
//! - [`Vertex3d`]: the vertex format shared by every scene mesh
//! - [`GpuMesh`]: vertex and index buffers resident on the GPU
//!
//! A [`MeshHandle`](crate::MeshHandle) in a draw node is an index into the
//! slice of `GpuMesh`es handed to [`MirrorPass::replay`](crate::MirrorPass::replay).
//!
//! # Winding Order
//!
//! Front faces wind **clockwise** as seen from outside, the same convention as
//! mirror polygons. The mirror pass culls by that rule and flips it per
//! reflection depth.
//!
//! # Vertex Layout
//!
//! | Attribute | Format    | Offset | Shader Location |
//! |-----------|-----------|--------|-----------------|
//! | position  | Float32x3 | 0      | 0               |
//! | normal    | Float32x3 | 12     | 1               |
//! | uv        | Float32x2 | 24     | 2               |

use crate::aabb::Aabb;
use crate::gpu::GpuContext;
use glam::Vec3;

/// A vertex with position, normal, and texture coordinates.
///
/// `#[repr(C)]` with [`bytemuck::Pod`] so vertex slices can be uploaded
/// directly.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex3d {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &Self::ATTRIBUTES,
    };

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// CPU-side geometry, ready to upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex3d>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// A unit cube centered at the origin, one quad per face.
    pub fn cube() -> Self {
        // (normal, u, v) with u x v == normal, so the quads wind clockwise
        // from outside with the shared index pattern below
        const FACES: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        ];
        const CORNERS: [(f32, f32); 4] = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];

        let mut vertices = Vec::with_capacity(24);
        for (normal, u, v) in FACES {
            for (x, y) in CORNERS {
                let position = normal * 0.5 + u * x + v * y;
                vertices.push(Vertex3d::new(
                    position.to_array(),
                    normal.to_array(),
                    [x + 0.5, y + 0.5],
                ));
            }
        }

        let indices = (0..6u32)
            .flat_map(|face| {
                let base = face * 4;
                [base, base + 2, base + 1, base + 2, base, base + 3]
            })
            .collect();

        Self { vertices, indices }
    }

    /// A `size` x `size` ground plane on XZ facing +Y.
    pub fn plane(size: f32) -> Self {
        let h = size / 2.0;
        let up = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex3d::new([-h, 0.0, -h], up, [0.0, 0.0]),
            Vertex3d::new([h, 0.0, -h], up, [1.0, 0.0]),
            Vertex3d::new([h, 0.0, h], up, [1.0, 1.0]),
            Vertex3d::new([-h, 0.0, h], up, [0.0, 1.0]),
        ];
        Self {
            vertices,
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    /// Local bounds of the vertices, for use as a draw node's bounds.
    pub fn bounds(&self) -> Aabb {
        self.vertices
            .iter()
            .fold(Aabb::EMPTY, |b, v| b.expand_point(Vec3::from_array(v.position)))
    }

    /// Triangles as position triples, in index order.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).filter_map(|tri| {
            let get = |i: u32| {
                self.vertices
                    .get(i as usize)
                    .map(|v| Vec3::from_array(v.position))
            };
            Some([get(tri[0])?, get(tri[1])?, get(tri[2])?])
        })
    }
}

/// GPU-resident mesh geometry with vertex and index buffers.
#[derive(Debug)]
pub struct GpuMesh {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    pub(crate) index_count: u32,
}

impl GpuMesh {
    /// Uploads `vertices` and `indices`.
    pub fn new(gpu: &GpuContext, vertices: &[Vertex3d], indices: &[u32]) -> Self {
        use wgpu::util::DeviceExt;

        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    pub fn from_data(gpu: &GpuContext, data: &MeshData) -> Self {
        Self::new(gpu, &data.vertices, &data.indices)
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}
