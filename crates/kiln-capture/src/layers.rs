//! Layer processors and the per-channel capture pipeline
//!
//! A generation request captures one pixel buffer per visual channel the
//! model consumes. Each channel is described by a [`LayerSpec`] template held
//! in the model options; per request the template is instantiated into a
//! [`LayerProcessor`] that runs a begin/capture/end/process cycle against a
//! capture component. Layers are processed sequentially in declared order on
//! the thread that owns the component - readback is blocking and concurrent
//! capture against one component is not defined.

use crate::component::{CaptureComponent, CaptureMode};
use kiln_core::{FrameSize, KilnError, Result, Rgba8};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The visual channel a layer carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// The tonemapped scene color - for viewport-source generations this
    /// comes from the live frame grab rather than a scene capture
    FinalColor,
    Depth,
    Normal,
    Mask,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::FinalColor => write!(f, "final_color"),
            LayerKind::Depth => write!(f, "depth"),
            LayerKind::Normal => write!(f, "normal"),
            LayerKind::Mask => write!(f, "mask"),
        }
    }
}

/// Parameters for depth capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthParams {
    /// World-unit distance mapped to full white
    #[serde(default = "default_depth_scale")]
    pub depth_scale: f32,
    /// World-unit distance mapped to black
    #[serde(default)]
    pub start_depth: f32,
}

fn default_depth_scale() -> f32 {
    2000.0
}

impl Default for DepthParams {
    fn default() -> Self {
        Self {
            depth_scale: default_depth_scale(),
            start_depth: 0.0,
        }
    }
}

/// Parameters for custom mask capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskParams {
    /// Name of the stencil channel to capture
    pub channel: String,
}

/// Template describing one layer a model expects.
///
/// Held (ordered) in the model options; instantiated into a fresh processor
/// for every generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub kind: LayerKind,
    #[serde(default)]
    pub depth: Option<DepthParams>,
    #[serde(default)]
    pub mask: Option<MaskParams>,
}

impl LayerSpec {
    pub fn final_color() -> Self {
        Self {
            kind: LayerKind::FinalColor,
            depth: None,
            mask: None,
        }
    }

    pub fn depth(params: DepthParams) -> Self {
        Self {
            kind: LayerKind::Depth,
            depth: Some(params),
            mask: None,
        }
    }

    pub fn normal() -> Self {
        Self {
            kind: LayerKind::Normal,
            depth: None,
            mask: None,
        }
    }

    pub fn mask(channel: impl Into<String>) -> Self {
        Self {
            kind: LayerKind::Mask,
            depth: None,
            mask: Some(MaskParams {
                channel: channel.into(),
            }),
        }
    }

    /// Instantiate a fresh processor for this spec
    pub fn create_processor(&self) -> Box<dyn LayerProcessor> {
        match self.kind {
            LayerKind::FinalColor => Box::new(FinalColorLayer::new()),
            LayerKind::Depth => Box::new(DepthLayer::new(
                self.depth.clone().unwrap_or_default(),
            )),
            LayerKind::Normal => Box::new(NormalLayer::new()),
            LayerKind::Mask => Box::new(MaskLayer::new(
                self.mask
                    .as_ref()
                    .map(|m| m.channel.clone())
                    .unwrap_or_default(),
            )),
        }
    }
}

/// One captureable visual channel.
///
/// `begin_capture` swaps the component's visualization state and sizes its
/// target, `capture` renders the scene, `end_capture` restores the prior
/// state, and `process` reads the target back as the layer's pixel buffer.
pub trait LayerProcessor: Send {
    fn kind(&self) -> LayerKind;

    fn name(&self) -> &str;

    fn begin_capture(
        &mut self,
        size: FrameSize,
        capture: &mut dyn CaptureComponent,
    ) -> Result<()>;

    fn capture(&mut self, capture: &mut dyn CaptureComponent) -> Result<()>;

    fn end_capture(&mut self, capture: &mut dyn CaptureComponent) -> Result<()>;

    fn process(&mut self, capture: &mut dyn CaptureComponent) -> Result<Vec<Rgba8>>;
}

/// A processed layer: the processor that captured it plus its pixel buffer.
/// Recreated per generation request; buffers never persist across requests.
pub struct LayerData {
    pub processor: Box<dyn LayerProcessor>,
    pub pixels: Vec<Rgba8>,
    pub size: FrameSize,
}

impl LayerData {
    /// An empty layer awaiting externally supplied pixels (the viewport
    /// frame grab path)
    pub fn empty(processor: Box<dyn LayerProcessor>, size: FrameSize) -> Self {
        Self {
            processor,
            pixels: Vec::new(),
            size,
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.processor.kind()
    }
}

impl fmt::Debug for LayerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerData")
            .field("kind", &self.kind())
            .field("size", &self.size)
            .field("pixels", &self.pixels.len())
            .finish()
    }
}

/// Run the full begin/capture/end/process cycle for every spec in declared
/// order against one capture component. The returned list has the same
/// length and order as `specs`; each buffer holds `size.area()` pixels.
pub fn process_layers(
    specs: &[LayerSpec],
    size: FrameSize,
    capture: &mut dyn CaptureComponent,
) -> Result<Vec<LayerData>> {
    let mut processed = Vec::with_capacity(specs.len());

    for spec in specs {
        let mut processor = spec.create_processor();
        processor.begin_capture(size, capture)?;
        processor.capture(capture)?;
        processor.end_capture(capture)?;
        let pixels = processor.process(capture)?;
        processed.push(LayerData {
            processor,
            pixels,
            size,
        });
    }

    Ok(processed)
}

fn swap_in_mode(
    prev: &mut Option<CaptureMode>,
    mode: CaptureMode,
    size: FrameSize,
    capture: &mut dyn CaptureComponent,
) -> Result<()> {
    *prev = Some(capture.visualization());
    capture.set_visualization(mode);
    capture.resize_target(size)
}

fn restore_mode(prev: &mut Option<CaptureMode>, capture: &mut dyn CaptureComponent) {
    if let Some(mode) = prev.take() {
        capture.set_visualization(mode);
    }
}

fn read_processed(capture: &mut dyn CaptureComponent) -> Result<Vec<Rgba8>> {
    let expected = capture.target_size().area();
    let pixels = capture.read_pixels()?;
    if pixels.len() != expected {
        return Err(KilnError::LayerError(format!(
            "readback returned {} pixels, expected {}",
            pixels.len(),
            expected
        )));
    }
    Ok(pixels)
}

/// The live scene color as the user sees it
pub struct FinalColorLayer {
    prev_mode: Option<CaptureMode>,
}

impl FinalColorLayer {
    pub fn new() -> Self {
        Self { prev_mode: None }
    }
}

impl Default for FinalColorLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerProcessor for FinalColorLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::FinalColor
    }

    fn name(&self) -> &str {
        "final color"
    }

    fn begin_capture(
        &mut self,
        size: FrameSize,
        capture: &mut dyn CaptureComponent,
    ) -> Result<()> {
        swap_in_mode(&mut self.prev_mode, CaptureMode::FinalColor, size, capture)
    }

    fn capture(&mut self, capture: &mut dyn CaptureComponent) -> Result<()> {
        capture.capture()
    }

    fn end_capture(&mut self, capture: &mut dyn CaptureComponent) -> Result<()> {
        restore_mode(&mut self.prev_mode, capture);
        Ok(())
    }

    fn process(&mut self, capture: &mut dyn CaptureComponent) -> Result<Vec<Rgba8>> {
        read_processed(capture)
    }
}

/// Scene depth remapped to grayscale
pub struct DepthLayer {
    params: DepthParams,
    prev_mode: Option<CaptureMode>,
}

impl DepthLayer {
    pub fn new(params: DepthParams) -> Self {
        Self {
            params,
            prev_mode: None,
        }
    }
}

impl LayerProcessor for DepthLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Depth
    }

    fn name(&self) -> &str {
        "depth"
    }

    fn begin_capture(
        &mut self,
        size: FrameSize,
        capture: &mut dyn CaptureComponent,
    ) -> Result<()> {
        swap_in_mode(
            &mut self.prev_mode,
            CaptureMode::Depth {
                depth_scale: self.params.depth_scale,
                start_depth: self.params.start_depth,
            },
            size,
            capture,
        )
    }

    fn capture(&mut self, capture: &mut dyn CaptureComponent) -> Result<()> {
        capture.capture()
    }

    fn end_capture(&mut self, capture: &mut dyn CaptureComponent) -> Result<()> {
        restore_mode(&mut self.prev_mode, capture);
        Ok(())
    }

    fn process(&mut self, capture: &mut dyn CaptureComponent) -> Result<Vec<Rgba8>> {
        read_processed(capture)
    }
}

/// World-space normals encoded as color
pub struct NormalLayer {
    prev_mode: Option<CaptureMode>,
}

impl NormalLayer {
    pub fn new() -> Self {
        Self { prev_mode: None }
    }
}

impl Default for NormalLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerProcessor for NormalLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Normal
    }

    fn name(&self) -> &str {
        "normal"
    }

    fn begin_capture(
        &mut self,
        size: FrameSize,
        capture: &mut dyn CaptureComponent,
    ) -> Result<()> {
        swap_in_mode(&mut self.prev_mode, CaptureMode::WorldNormal, size, capture)
    }

    fn capture(&mut self, capture: &mut dyn CaptureComponent) -> Result<()> {
        capture.capture()
    }

    fn end_capture(&mut self, capture: &mut dyn CaptureComponent) -> Result<()> {
        restore_mode(&mut self.prev_mode, capture);
        Ok(())
    }

    fn process(&mut self, capture: &mut dyn CaptureComponent) -> Result<Vec<Rgba8>> {
        read_processed(capture)
    }
}

/// A named custom stencil channel
pub struct MaskLayer {
    channel: String,
    prev_mode: Option<CaptureMode>,
}

impl MaskLayer {
    pub fn new(channel: String) -> Self {
        Self {
            channel,
            prev_mode: None,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl LayerProcessor for MaskLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Mask
    }

    fn name(&self) -> &str {
        "mask"
    }

    fn begin_capture(
        &mut self,
        size: FrameSize,
        capture: &mut dyn CaptureComponent,
    ) -> Result<()> {
        swap_in_mode(
            &mut self.prev_mode,
            CaptureMode::Mask {
                channel: self.channel.clone(),
            },
            size,
            capture,
        )
    }

    fn capture(&mut self, capture: &mut dyn CaptureComponent) -> Result<()> {
        capture.capture()
    }

    fn end_capture(&mut self, capture: &mut dyn CaptureComponent) -> Result<()> {
        restore_mode(&mut self.prev_mode, capture);
        Ok(())
    }

    fn process(&mut self, capture: &mut dyn CaptureComponent) -> Result<Vec<Rgba8>> {
        read_processed(capture)
    }
}
