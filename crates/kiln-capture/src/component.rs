//! Capture component trait and capture configuration

use kiln_core::{CameraPose, FrameSize, Result, Rgba8};
use serde::{Deserialize, Serialize};

/// Which visual channel a capture renders
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CaptureMode {
    /// The tonemapped scene color, as a user would see it
    #[default]
    FinalColor,
    /// Scene depth remapped into the 0-255 range
    Depth { depth_scale: f32, start_depth: f32 },
    /// World-space normals encoded as color
    WorldNormal,
    /// A named custom stencil/mask channel
    Mask { channel: String },
}

/// How a capture component behaves between captures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Render the capture every frame rather than only on camera movement
    pub capture_every_frame: bool,
    /// Re-render when the component moves
    pub capture_on_movement: bool,
    /// Keep temporal rendering state alive between captures
    pub persist_rendering_state: bool,
    /// Overwrite the target instead of compositing into it
    pub composite_overwrite: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        // The settings a generation capture needs: continuous rendering with
        // stable temporal state, fully overwriting the target each frame.
        Self {
            capture_every_frame: true,
            capture_on_movement: false,
            persist_rendering_state: true,
            composite_overwrite: true,
        }
    }
}

/// An offscreen camera that renders the scene to a texture instead of the
/// screen.
///
/// Implemented by the editor host for real engine capture actors and by
/// [`crate::OffscreenCapture`] for wgpu-backed headless capture. All methods
/// must be called from the thread that owns the component; concurrent capture
/// against the same component is not defined.
pub trait CaptureComponent {
    /// Apply capture behavior settings
    fn apply_settings(&mut self, settings: &CaptureSettings);

    /// Move the capture camera
    fn set_pose(&mut self, pose: CameraPose);

    /// Current capture camera pose
    fn pose(&self) -> CameraPose;

    /// Select the visual channel the next capture renders
    fn set_visualization(&mut self, mode: CaptureMode);

    /// Currently selected visual channel
    fn visualization(&self) -> CaptureMode;

    /// Size of a pre-bound fixed render target, if the component has one.
    /// Components without a fixed target derive their size from the caller.
    fn fixed_target_size(&self) -> Option<FrameSize>;

    /// Resize the render target
    fn resize_target(&mut self, size: FrameSize) -> Result<()>;

    /// Current render target size
    fn target_size(&self) -> FrameSize;

    /// Render the scene into the render target
    fn capture(&mut self) -> Result<()>;

    /// Read the render target back as tightly-packed RGBA pixels
    fn read_pixels(&mut self) -> Result<Vec<Rgba8>>;
}
