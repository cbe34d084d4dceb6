//! Kiln Capture - frame acquisition for image generation
//!
//! Provides the capture side of the generation pipeline: one-shot viewport
//! frame grabbing, transient scene-capture rigs mirroring the editor camera,
//! and the per-channel layer processing pipeline that turns a scene into the
//! pixel buffers a generative model consumes.

pub mod component;
pub mod frame;
pub mod grabber;
pub mod host;
pub mod layers;
pub mod offscreen;
pub mod rig;

pub use component::{CaptureComponent, CaptureMode, CaptureSettings};
pub use frame::copy_frame_region;
pub use grabber::{FrameGrabber, FramePayload, FrameTap};
pub use host::{EditorHost, ViewportKind, ViewportSnapshot};
pub use layers::{
    process_layers, DepthParams, LayerData, LayerKind, LayerProcessor, LayerSpec, MaskParams,
};
pub use offscreen::{OffscreenCapture, OffscreenContext, SceneRenderer};
pub use rig::{create_rig, update_rig, SceneCaptureRig};
