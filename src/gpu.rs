//! Device, queue and window surface for the mirror pass.
//!
//! [`GpuContext`] is created once from a winit [`Window`] and borrowed by
//! [`MirrorPass`](crate::MirrorPass) for pipeline creation, uploads and depth
//! target sizing. Initialization failures are returned as
//! [`MirrorError`](crate::MirrorError) values instead of panicking, so a
//! viewer can log them and exit cleanly.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use speculum::GpuContext;
//! # fn run(window: Arc<winit::window::Window>) -> speculum::Result<()> {
//! let gpu = GpuContext::new(window)?;
//! println!("{}x{} (aspect: {})", gpu.width(), gpu.height(), gpu.aspect());
//! # Ok(())
//! # }
//! ```
//!
//! [`Window`]: winit::window::Window

use std::sync::Arc;

use log::{debug, info};
use winit::window::Window;

use crate::error::Result;

/// wgpu device, queue and configured surface.
///
/// Fields are public for code that needs raw wgpu access next to the pass.
pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Surface format, size and present mode. The mirror pass builds its
    /// pipelines for `config.format`.
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Opens a device that can present to `window`.
    ///
    /// # Errors
    ///
    /// Fails when the surface, adapter or device cannot be created.
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        let info = adapter.get_info();
        info!("gpu: {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Speculum Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: Default::default(),
            experimental_features: Default::default(),
        }))?;

        let config = surface_config(&surface.get_capabilities(&adapter), size.width, size.height);
        debug!(
            "surface {}x{} {:?}, {:?}",
            config.width, config.height, config.format, config.alpha_mode
        );
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
        })
    }

    /// Reconfigures the surface for a new window size.
    ///
    /// Zero sizes, reported while the window is minimized, are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Width over height, for building projection matrices.
    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }
}

/// First sRGB format, else the first format offered.
fn preferred_format(formats: &[wgpu::TextureFormat]) -> wgpu::TextureFormat {
    formats
        .iter()
        .copied()
        .find(wgpu::TextureFormat::is_srgb)
        .or_else(|| formats.first().copied())
        .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb)
}

/// Vsync'd configuration for a `width` x `height` surface, at least 1x1.
fn surface_config(
    caps: &wgpu::SurfaceCapabilities,
    width: u32,
    height: u32,
) -> wgpu::SurfaceConfiguration {
    wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: preferred_format(&caps.formats),
        width: width.max(1),
        height: height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: Vec::new(),
        desired_maximum_frame_latency: 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::TextureFormat;

    #[test]
    fn test_prefers_srgb_format() {
        let formats = [TextureFormat::Bgra8Unorm, TextureFormat::Rgba8UnormSrgb];
        assert_eq!(preferred_format(&formats), TextureFormat::Rgba8UnormSrgb);
        assert_eq!(
            preferred_format(&[TextureFormat::Rgba16Float]),
            TextureFormat::Rgba16Float
        );
        assert_eq!(preferred_format(&[]), TextureFormat::Bgra8UnormSrgb);
    }

    #[test]
    fn test_surface_config_clamps_size() {
        let mut caps = wgpu::SurfaceCapabilities::default();
        caps.formats = vec![TextureFormat::Bgra8UnormSrgb];
        caps.alpha_modes = vec![wgpu::CompositeAlphaMode::Opaque];
        let config = surface_config(&caps, 0, 720);
        assert_eq!((config.width, config.height), (1, 720));
        assert_eq!(config.alpha_mode, wgpu::CompositeAlphaMode::Opaque);
        assert_eq!(config.present_mode, wgpu::PresentMode::Fifo);
    }
}
