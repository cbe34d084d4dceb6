//! Capture every layer of a minimal scene to PNGs.
//!
//! Run with: cargo run -p kiln-capture --example layer_capture
//!
//! The scene renderer here just clears the target with a per-channel color -
//! enough to drive the full begin/capture/end/process cycle through a real
//! wgpu context and readback.

use kiln_capture::{
    process_layers, CaptureMode, DepthParams, LayerSpec, OffscreenCapture, OffscreenContext,
    SceneRenderer,
};
use kiln_core::{pixels_to_bytes, CameraPose, FrameSize, Result};
use std::path::Path;

struct ClearColorRenderer;

impl SceneRenderer for ClearColorRenderer {
    fn draw(
        &mut self,
        pose: &CameraPose,
        mode: &CaptureMode,
        ctx: &OffscreenContext,
    ) -> Result<()> {
        let color = match mode {
            CaptureMode::FinalColor => wgpu::Color {
                r: 0.35,
                g: 0.55,
                b: 0.80 + (pose.fov as f64 / 1000.0),
                a: 1.0,
            },
            CaptureMode::Depth { start_depth, .. } => {
                let v = (*start_depth as f64 / 255.0).clamp(0.0, 1.0);
                wgpu::Color {
                    r: v,
                    g: v,
                    b: v,
                    a: 1.0,
                }
            }
            CaptureMode::WorldNormal => wgpu::Color {
                r: 0.5,
                g: 0.5,
                b: 1.0,
                a: 1.0,
            },
            CaptureMode::Mask { .. } => wgpu::Color {
                r: 1.0,
                g: 0.0,
                b: 0.0,
                a: 1.0,
            },
        };

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Layer Capture Encoder"),
            });
        {
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Layer Capture Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &ctx.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

fn main() {
    let size = FrameSize::new(256, 256);
    let mut capture = OffscreenCapture::new(size, Box::new(ClearColorRenderer))
        .expect("Failed to create offscreen capture");

    let specs = vec![
        LayerSpec::final_color(),
        LayerSpec::depth(DepthParams::default()),
        LayerSpec::normal(),
        LayerSpec::mask("foreground"),
    ];

    let layers = process_layers(&specs, size, &mut capture).expect("Layer pipeline failed");

    let out_dir = Path::new("captures");
    std::fs::create_dir_all(out_dir).expect("Failed to create captures dir");

    for layer in &layers {
        let path = out_dir.join(format!("{}.png", layer.kind()));
        let img = image::RgbaImage::from_raw(
            layer.size.width,
            layer.size.height,
            pixels_to_bytes(&layer.pixels),
        )
        .expect("Pixel buffer does not match size");
        img.save(&path).expect("Failed to save PNG");
        println!("Captured {}", path.display());
    }
}
