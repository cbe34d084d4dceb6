//! Model options, generation input and image result types

use kiln_capture::{LayerData, LayerSpec};
use kiln_core::{FrameSize, Rgba8};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the model pads input that does not match its native size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingMode {
    #[default]
    Zeros,
    Reflect,
    Edge,
}

/// Configuration of the active model.
///
/// Lives from a successful `init_model` until the model is released or
/// reinitialized. The layer list is the ordered template of channels the
/// model consumes; every generation request instantiates it afresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Model identifier understood by the backend
    pub model_id: String,
    #[serde(default)]
    pub revision: Option<String>,
    /// Ordered layers the model expects as input
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

impl ModelOptions {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            revision: None,
            layers: Vec::new(),
        }
    }

    pub fn with_layers(mut self, layers: Vec<LayerSpec>) -> Self {
        self.layers = layers;
        self
    }
}

/// Per-request generation parameters. Opaque to the capture core; the
/// capture pipeline only stamps the true input size before handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub seed: Option<u64>,
    /// How strongly the input image steers the result, 0.0 - 1.0
    #[serde(default = "default_strength")]
    pub strength: f32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// True size of the captured input, stamped by the capture pipeline
    #[serde(default)]
    pub in_size: FrameSize,
    /// Requested output size; zero means "same as input"
    #[serde(default)]
    pub out_size: FrameSize,
}

fn default_strength() -> f32 {
    0.75
}
fn default_guidance_scale() -> f32 {
    7.5
}
fn default_iterations() -> u32 {
    25
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            seed: None,
            strength: default_strength(),
            guidance_scale: default_guidance_scale(),
            iterations: default_iterations(),
            in_size: FrameSize::default(),
            out_size: FrameSize::default(),
        }
    }
}

/// The composed input for one generation request: parameters plus the
/// ordered captured layers. Owned by the call that constructs it until
/// handed to the backend; moved across thread boundaries, never shared.
pub struct GenerationInput {
    pub options: GenerationOptions,
    pub layers: Vec<LayerData>,
}

impl GenerationInput {
    pub fn new(options: GenerationOptions) -> Self {
        Self {
            options,
            layers: Vec::new(),
        }
    }
}

impl fmt::Debug for GenerationInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationInput")
            .field("options", &self.options)
            .field("layers", &self.layers)
            .finish()
    }
}

/// The outcome of a generation or upsample call.
///
/// Backend failure is carried in `error`, never raised - the result flows
/// through the same completion broadcast either way.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResult {
    pub pixels: Vec<Rgba8>,
    pub size: FrameSize,
    /// The parameters that produced this image
    pub options: GenerationOptions,
    pub upsampled: bool,
    pub completed: bool,
    pub error: Option<String>,
}

impl ImageResult {
    pub fn completed(pixels: Vec<Rgba8>, size: FrameSize, options: GenerationOptions) -> Self {
        Self {
            pixels,
            size,
            options,
            upsampled: false,
            completed: true,
            error: None,
        }
    }

    pub fn failed(options: GenerationOptions, error: impl Into<String>) -> Self {
        Self {
            pixels: Vec::new(),
            size: FrameSize::default(),
            options,
            upsampled: false,
            completed: false,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.completed || self.error.is_some()
    }
}

/// One step of backend progress, forwarded to the studio event bus
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub step: u32,
    pub timestep: i32,
    /// 0.0 - 1.0
    pub progress: f32,
    pub size: FrameSize,
    /// Intermediate preview pixels; may be empty for backends that do not
    /// stream previews
    pub pixels: Vec<Rgba8>,
}
