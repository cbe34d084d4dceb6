//! Generative backend trait

use crate::options::{GenerationInput, ImageResult, ModelOptions, PaddingMode, ProgressUpdate};
use std::sync::mpsc::Sender;

/// The external generative-model service.
///
/// Backends are shared as `Arc<dyn GenerativeBackend>` between the
/// orchestrator and its background workers, so every method takes `&self`;
/// implementations keep whatever interior state they need behind atomics or
/// their own synchronization. `generate` and `upsample` are blocking calls
/// intended for a background thread and report failure through the returned
/// [`ImageResult`], never by panicking. `init_model` returns a success flag.
pub trait GenerativeBackend: Send + Sync {
    /// Backend name as registered (e.g. "mock", "remote")
    fn name(&self) -> &str;

    /// Load a model. Returns true on success; on failure the backend stays
    /// in its previous state.
    fn init_model(
        &self,
        options: &ModelOptions,
        allow_unsafe_content: bool,
        padding_mode: PaddingMode,
    ) -> bool;

    /// Unload the active model. Safe to call when none is loaded.
    fn release_model(&self);

    /// Generate an image from composed layer input. Blocks until the backend
    /// finishes or the call is cancelled via `stop_generation`.
    fn generate(&self, input: &GenerationInput) -> ImageResult;

    /// Upsample a previous result. Blocks like `generate`.
    fn upsample(&self, result: &ImageResult) -> ImageResult;

    /// Request cancellation of an in-flight generation. Cooperative and
    /// best-effort: the blocking `generate` call returns a failed result once
    /// the backend notices.
    fn stop_generation(&self);

    /// Register a channel for per-step progress updates. Backends that do
    /// not stream progress may ignore the sender.
    fn set_progress_sender(&self, sender: Sender<ProgressUpdate>);

    /// The stored service token, if any
    fn token(&self) -> Option<String>;

    /// Store and validate a service token. Returns true when accepted.
    fn login_with_token(&self, token: &str) -> bool;
}
