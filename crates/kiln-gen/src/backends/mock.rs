//! Mock backend for testing and offline work
//!
//! Produces a deterministic seeded gradient, blended with the final-color
//! input layer when one is present, without any network calls. Steps are
//! paced so cooperative cancellation and progress streaming behave like a
//! real backend, just fast.

use crate::backend::GenerativeBackend;
use crate::options::{
    GenerationInput, GenerationOptions, ImageResult, ModelOptions, PaddingMode, ProgressUpdate,
};
use kiln_capture::LayerKind;
use kiln_core::{FrameSize, Rgba8};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::time::Duration;

const STEP_PACING: Duration = Duration::from_millis(1);

#[derive(Default)]
struct MockState {
    model: Option<ModelOptions>,
    token: Option<String>,
    progress: Option<Sender<ProgressUpdate>>,
}

/// A backend that generates deterministic placeholder images locally
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    cancelled: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit_progress(&self, update: ProgressUpdate) {
        let state = self.state.lock().unwrap();
        if let Some(sender) = &state.progress {
            let _ = sender.send(update);
        }
    }
}

impl GenerativeBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn init_model(
        &self,
        options: &ModelOptions,
        _allow_unsafe_content: bool,
        _padding_mode: PaddingMode,
    ) -> bool {
        if options.model_id.is_empty() {
            return false;
        }
        self.state.lock().unwrap().model = Some(options.clone());
        true
    }

    fn release_model(&self) {
        self.state.lock().unwrap().model = None;
    }

    fn generate(&self, input: &GenerationInput) -> ImageResult {
        let options = input.options.clone();

        if self.state.lock().unwrap().model.is_none() {
            return ImageResult::failed(options, "no model initialised");
        }

        let size = if options.out_size.is_empty() {
            options.in_size
        } else {
            options.out_size
        };
        if size.is_empty() {
            return ImageResult::failed(options, "input size is zero");
        }

        self.cancelled.store(false, Ordering::Release);

        let steps = options.iterations.max(1);
        for step in 0..steps {
            if self.cancelled.load(Ordering::Acquire) {
                return ImageResult::failed(options, "generation stopped");
            }
            self.emit_progress(ProgressUpdate {
                step,
                timestep: ((steps - step) * 40) as i32,
                progress: (step + 1) as f32 / steps as f32,
                size,
                pixels: Vec::new(),
            });
            std::thread::sleep(STEP_PACING);
        }

        let seed = options
            .seed
            .unwrap_or_else(|| prompt_seed(&options.prompt));
        let mut pixels = gradient(seed, size);

        // Steer toward the captured scene when a final-color layer is present
        if let Some(layer) = input
            .layers
            .iter()
            .find(|l| l.kind() == LayerKind::FinalColor && !l.pixels.is_empty())
        {
            if layer.pixels.len() == pixels.len() {
                for (out, src) in pixels.iter_mut().zip(layer.pixels.iter()) {
                    *out = blend(*out, *src);
                }
            }
        }

        ImageResult::completed(pixels, size, options)
    }

    fn upsample(&self, result: &ImageResult) -> ImageResult {
        if result.is_failure() {
            return ImageResult::failed(result.options.clone(), "cannot upsample a failed result");
        }

        let out_size = FrameSize::new(result.size.width * 2, result.size.height * 2);
        let mut pixels = Vec::with_capacity(out_size.area());
        for y in 0..out_size.height {
            for x in 0..out_size.width {
                let src_x = (x / 2).min(result.size.width - 1) as usize;
                let src_y = (y / 2).min(result.size.height - 1) as usize;
                pixels.push(result.pixels[src_y * result.size.width as usize + src_x]);
            }
        }

        ImageResult {
            pixels,
            size: out_size,
            options: result.options.clone(),
            upsampled: true,
            completed: true,
            error: None,
        }
    }

    fn stop_generation(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn set_progress_sender(&self, sender: Sender<ProgressUpdate>) {
        self.state.lock().unwrap().progress = Some(sender);
    }

    fn token(&self) -> Option<String> {
        self.state.lock().unwrap().token.clone()
    }

    fn login_with_token(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        self.state.lock().unwrap().token = Some(token.to_string());
        true
    }
}

fn prompt_seed(prompt: &str) -> u64 {
    prompt
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
}

fn gradient(seed: u64, size: FrameSize) -> Vec<Rgba8> {
    let mut pixels = Vec::with_capacity(size.area());
    let max_x = size.width.max(2) - 1;
    let max_y = size.height.max(2) - 1;
    let tint = (seed % 256) as u8;
    for y in 0..size.height {
        for x in 0..size.width {
            pixels.push(Rgba8::new(
                (x * 255 / max_x) as u8,
                (y * 255 / max_y) as u8,
                tint,
                255,
            ));
        }
    }
    pixels
}

fn blend(a: Rgba8, b: Rgba8) -> Rgba8 {
    Rgba8::new(
        ((a.r as u16 + b.r as u16) / 2) as u8,
        ((a.g as u16 + b.g as u16) / 2) as u8,
        ((a.b as u16 + b.b as u16) / 2) as u8,
        255,
    )
}
