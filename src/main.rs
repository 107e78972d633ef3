use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use speculum::{
    Camera, CommandList, DrawNode, GpuContext, GpuMesh, InstancedNode, Mat4, MeshData, MeshHandle,
    MirrorCatalog, MirrorConfig, MirrorPass, MirrorPolygon, MirrorTreeRenderer, Scene,
    ShaderTechnique, Vec3, Vec4,
};

const CUBE: MeshHandle = MeshHandle(0);
const FLOOR: MeshHandle = MeshHandle(1);

/// Two facing mirrors with a few objects between them.
fn mirror_room() -> speculum::Result<(MirrorCatalog, Scene)> {
    let (w, h) = (3.0, 2.0);
    let left = MirrorPolygon::new(&[
        Vec3::new(-4.0, 0.0, w),
        Vec3::new(-4.0, h, w),
        Vec3::new(-4.0, h, -w),
        Vec3::new(-4.0, 0.0, -w),
    ])?
    .tint(Vec4::new(0.7, 0.8, 1.0, 0.1));
    let right = MirrorPolygon::new(&[
        Vec3::new(4.0, 0.0, -w),
        Vec3::new(4.0, h, -w),
        Vec3::new(4.0, h, w),
        Vec3::new(4.0, 0.0, w),
    ])?
    .tint(Vec4::new(0.7, 0.8, 1.0, 0.1));
    let catalog = MirrorCatalog::new(vec![left, right]).with_bvh();

    let mut scene = Scene::new();
    scene.add_node(
        DrawNode::new(FLOOR, ShaderTechnique::Color3D)
            .bounds(MeshData::plane(12.0).bounds())
            .color(Vec4::new(0.35, 0.35, 0.4, 1.0)),
    );
    scene.add_node(
        DrawNode::new(CUBE, ShaderTechnique::Color3D)
            .at(Vec3::new(0.0, 0.5, 0.0))
            .color(Vec4::new(0.9, 0.3, 0.2, 1.0)),
    );
    scene.add_node(
        DrawNode::new(CUBE, ShaderTechnique::Color3D)
            .world(Mat4::from_scale_rotation_translation(
                Vec3::splat(0.6),
                glam::Quat::from_rotation_y(0.6),
                Vec3::new(1.5, 0.3, 1.0),
            ))
            .color(Vec4::new(0.2, 0.6, 0.9, 0.6)),
    );
    let pillars = (0..4)
        .map(|i| {
            let z = -2.25 + 1.5 * i as f32;
            Mat4::from_scale_rotation_translation(
                Vec3::new(0.2, 1.6, 0.2),
                glam::Quat::IDENTITY,
                Vec3::new(-1.5, 0.8, z),
            )
        })
        .collect();
    scene.add_instanced(InstancedNode::new(CUBE, pillars).color(Vec4::new(0.8, 0.8, 0.7, 1.0)));

    Ok((catalog, scene))
}

struct Viewer {
    gpu: GpuContext,
    pass: MirrorPass,
    meshes: Vec<GpuMesh>,
    renderer: MirrorTreeRenderer,
    catalog: MirrorCatalog,
    scene: Scene,
    commands: CommandList,
}

impl Viewer {
    fn new(window: Arc<Window>) -> speculum::Result<Self> {
        let gpu = GpuContext::new(window)?;
        let pass = MirrorPass::new(&gpu);
        let meshes = vec![
            GpuMesh::from_data(&gpu, &MeshData::cube()),
            GpuMesh::from_data(&gpu, &MeshData::plane(12.0)),
        ];
        let renderer = MirrorTreeRenderer::new(MirrorConfig::new().max_depth(6).max_nodes(64))?;
        let (catalog, scene) = mirror_room()?;
        Ok(Self {
            gpu,
            pass,
            meshes,
            renderer,
            catalog,
            scene,
            commands: CommandList::new(),
        })
    }

    fn redraw(&mut self, time: f32) {
        let camera = Camera::new()
            .at(2.5 * time.cos(), 1.4, 2.5 * time.sin())
            .looking_at(0.0, 0.6, 0.0)
            .with_fov(70.0)
            .with_aspect(self.gpu.aspect());

        self.commands.clear();
        if let Err(err) = self.renderer.render_frame(
            camera.view_matrix(),
            camera.projection_matrix(),
            camera.position,
            &self.catalog,
            &self.scene,
            &mut self.commands,
        ) {
            log::error!("{err}");
            return;
        }

        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(err) => {
                log::warn!("skipping frame: {err}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.pass.ensure_depth_size(&self.gpu);
        self.pass.prepare(&self.gpu, &self.commands);

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Mirror Frame"),
            });
        {
            let mut render_pass = self.pass.begin(&mut encoder, &view);
            self.pass
                .replay(&mut render_pass, &self.commands, &self.meshes);
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}

struct App {
    window: Option<Arc<Window>>,
    viewer: Option<Viewer>,
    start_time: Instant,
}

impl Default for App {
    fn default() -> Self {
        Self {
            window: None,
            viewer: None,
            start_time: Instant::now(),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let attributes = Window::default_attributes().with_title("speculum");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };

        match Viewer::new(window.clone()) {
            Ok(viewer) => self.viewer = Some(viewer),
            Err(err) => {
                log::error!("{err}");
                event_loop.exit();
                return;
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.gpu.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.redraw(self.start_time.elapsed().as_secs_f32() * 0.3);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
    }
}

fn main() {
    env_logger::init();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("failed to create event loop: {err}");
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    if let Err(err) = event_loop.run_app(&mut app) {
        log::error!("{err}");
    }
}
