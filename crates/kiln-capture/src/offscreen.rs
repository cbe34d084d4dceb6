//! wgpu-backed offscreen capture component
//!
//! Renders the scene to a texture instead of a window surface and reads the
//! pixels back over a staging buffer. Scene drawing itself is delegated to a
//! host-provided [`SceneRenderer`] - the engine owns its pipelines; this
//! module owns the offscreen target, the capture state and the readback.

use crate::component::{CaptureComponent, CaptureMode, CaptureSettings};
use kiln_core::{bytes_to_pixels, CameraPose, FrameSize, KilnError, Result, Rgba8};

/// Draws the scene into an offscreen context for a given camera pose and
/// visual channel. Implemented by the host engine's renderer.
pub trait SceneRenderer: Send {
    fn draw(
        &mut self,
        pose: &CameraPose,
        mode: &CaptureMode,
        ctx: &OffscreenContext,
    ) -> Result<()>;
}

/// Offscreen wgpu context rendering to a texture instead of a window surface
pub struct OffscreenContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub color_texture: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth_texture: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
}

impl OffscreenContext {
    /// Create a new offscreen context with the given dimensions
    pub async fn new(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| KilnError::RenderError("no compatible GPU adapter".to_string()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Kiln Capture Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| KilnError::RenderError(e.to_string()))?;

        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let (color_texture, color_view, depth_texture, depth_view) =
            create_targets(&device, format, width, height);

        Ok(Self {
            device,
            queue,
            format,
            width,
            height,
            color_texture,
            color_view,
            depth_texture,
            depth_view,
        })
    }

    /// Recreate the color and depth targets at a new size
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        let (color_texture, color_view, depth_texture, depth_view) =
            create_targets(&self.device, self.format, width, height);
        self.color_texture = color_texture;
        self.color_view = color_view;
        self.depth_texture = depth_texture;
        self.depth_view = depth_view;
        self.width = width;
        self.height = height;
    }

    /// Read rendered pixels back from the color texture as tightly-packed
    /// RGBA bytes
    pub async fn read_pixels(&self) -> Result<Vec<u8>> {
        let bytes_per_pixel = 4u32;
        let unpadded_bytes_per_row = self.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let buffer_size = (padded_bytes_per_row * self.height) as u64;
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Readback Buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Readback Encoder"),
            });

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.color_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);

        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| KilnError::RenderError(e.to_string()))?
            .map_err(|e| KilnError::RenderError(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();

        // Strip row padding if present
        let mut pixels = Vec::with_capacity((self.width * self.height * bytes_per_pixel) as usize);
        for row in 0..self.height {
            let start = (row * padded_bytes_per_row) as usize;
            let end = start + unpadded_bytes_per_row as usize;
            pixels.extend_from_slice(&data[start..end]);
        }

        drop(data);
        staging_buffer.unmap();

        Ok(pixels)
    }

    /// Aspect ratio of this context
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

fn create_targets(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) -> (
    wgpu::Texture,
    wgpu::TextureView,
    wgpu::Texture,
    wgpu::TextureView,
) {
    let color_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Capture Color Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Capture Depth Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Depth32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

    (color_texture, color_view, depth_texture, depth_view)
}

/// A [`CaptureComponent`] backed by an offscreen wgpu context
pub struct OffscreenCapture {
    ctx: OffscreenContext,
    renderer: Box<dyn SceneRenderer>,
    pose: CameraPose,
    mode: CaptureMode,
    settings: CaptureSettings,
    fixed_size: Option<FrameSize>,
}

impl OffscreenCapture {
    /// Create a capture component with a freshly created offscreen context.
    /// Blocks on adapter and device acquisition.
    pub fn new(size: FrameSize, renderer: Box<dyn SceneRenderer>) -> Result<Self> {
        let ctx = pollster::block_on(OffscreenContext::new(size.width, size.height))?;
        Ok(Self {
            ctx,
            renderer,
            pose: CameraPose::default(),
            mode: CaptureMode::FinalColor,
            settings: CaptureSettings::default(),
            fixed_size: None,
        })
    }

    /// Bind a fixed render-target size. Scene-capture-source generations
    /// derive their capture size from this instead of the viewport.
    pub fn with_fixed_target(mut self, size: FrameSize) -> Self {
        self.ctx.resize(size.width, size.height);
        self.fixed_size = Some(size);
        self
    }

    pub fn context(&self) -> &OffscreenContext {
        &self.ctx
    }
}

impl CaptureComponent for OffscreenCapture {
    fn apply_settings(&mut self, settings: &CaptureSettings) {
        self.settings = settings.clone();
    }

    fn set_pose(&mut self, pose: CameraPose) {
        self.pose = pose;
    }

    fn pose(&self) -> CameraPose {
        self.pose
    }

    fn set_visualization(&mut self, mode: CaptureMode) {
        self.mode = mode;
    }

    fn visualization(&self) -> CaptureMode {
        self.mode.clone()
    }

    fn fixed_target_size(&self) -> Option<FrameSize> {
        self.fixed_size
    }

    fn resize_target(&mut self, size: FrameSize) -> Result<()> {
        if size.is_empty() {
            return Err(KilnError::RenderError(format!(
                "cannot resize capture target to {}",
                size
            )));
        }
        self.ctx.resize(size.width, size.height);
        Ok(())
    }

    fn target_size(&self) -> FrameSize {
        FrameSize::new(self.ctx.width, self.ctx.height)
    }

    fn capture(&mut self) -> Result<()> {
        self.renderer.draw(&self.pose, &self.mode, &self.ctx)
    }

    fn read_pixels(&mut self) -> Result<Vec<Rgba8>> {
        let bytes = pollster::block_on(self.ctx.read_pixels())?;
        Ok(bytes_to_pixels(&bytes))
    }
}
