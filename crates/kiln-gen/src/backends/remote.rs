//! Remote HTTP backend
//!
//! Talks JSON to a diffusion server over ureq. Layer pixels travel as
//! base64-encoded RGBA; generation failure comes back in the response body
//! and is surfaced through `ImageResult::error`, transport failure is
//! retried with bounded exponential backoff first.

use crate::backend::GenerativeBackend;
use crate::config::KilnConfig;
use crate::options::{
    GenerationInput, ImageResult, ModelOptions, PaddingMode, ProgressUpdate,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use kiln_core::{bytes_to_pixels, pixels_to_bytes, FrameSize, KilnError, Result, Rgba8};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://127.0.0.1:7860";
const REQUEST_TIMEOUT_SECS: u64 = 600;
const MAX_RETRIES: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Backend speaking to a generation server over HTTP
pub struct RemoteBackend {
    api_url: String,
    token: Mutex<Option<String>>,
    progress: Mutex<Option<Sender<ProgressUpdate>>>,
}

impl RemoteBackend {
    /// Create a new RemoteBackend from config
    pub fn from_config(config: &KilnConfig) -> Result<Self> {
        let api_url = config
            .api_url("remote")
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            api_url,
            token: Mutex::new(config.token("remote").map(|t| t.to_string())),
            progress: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn auth_header(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap()
            .as_ref()
            .map(|t| format!("Bearer {}", t))
    }

    fn post_json_with_retry(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        for attempt in 0..MAX_RETRIES {
            let agent = build_agent();
            let mut request = agent.post(url).header("Content-Type", "application/json");
            if let Some(auth) = self.auth_header() {
                request = request.header("Authorization", &auth);
            }

            match request.send_json(payload) {
                Ok(mut ok) => {
                    return ok.body_mut().read_json().map_err(|e| {
                        KilnError::GenerationError(format!(
                            "Failed to parse server response: {}",
                            e
                        ))
                    });
                }
                Err(e) => {
                    if attempt + 1 < MAX_RETRIES && is_retryable_error(&e) {
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(KilnError::GenerationError(format!(
                        "Request to {} failed: {}",
                        url, e
                    )));
                }
            }
        }

        Err(KilnError::GenerationError(format!(
            "Request to {} failed after retries",
            url
        )))
    }
}

fn build_agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .build();
    config.into()
}

fn is_retryable_error(e: &ureq::Error) -> bool {
    match e {
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound => true,
        ureq::Error::StatusCode(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
        _ => false,
    }
}

fn sleep_backoff(attempt: usize) {
    let delay_ms = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt);
    std::thread::sleep(Duration::from_millis(delay_ms));
}

/// Serialize the composed input into the server's generate payload
pub fn build_generate_payload(input: &GenerationInput) -> serde_json::Value {
    let layers: Vec<serde_json::Value> = input
        .layers
        .iter()
        .map(|layer| {
            serde_json::json!({
                "kind": layer.kind().to_string(),
                "width": layer.size.width,
                "height": layer.size.height,
                "pixels": BASE64.encode(pixels_to_bytes(&layer.pixels)),
            })
        })
        .collect();

    serde_json::json!({
        "prompt": input.options.prompt,
        "negative_prompt": input.options.negative_prompt,
        "seed": input.options.seed,
        "strength": input.options.strength,
        "guidance_scale": input.options.guidance_scale,
        "iterations": input.options.iterations,
        "in_width": input.options.in_size.width,
        "in_height": input.options.in_size.height,
        "out_width": input.options.out_size.width,
        "out_height": input.options.out_size.height,
        "layers": layers,
    })
}

/// Parse an image-bearing server response into pixels and size
pub fn parse_image_response(response: &serde_json::Value) -> Result<(Vec<Rgba8>, FrameSize)> {
    if let Some(error) = response.get("error").and_then(|e| e.as_str()) {
        return Err(KilnError::GenerationError(error.to_string()));
    }

    let width = response.get("width").and_then(|w| w.as_u64()).unwrap_or(0) as u32;
    let height = response.get("height").and_then(|h| h.as_u64()).unwrap_or(0) as u32;
    let size = FrameSize::new(width, height);

    let encoded = response
        .get("image")
        .and_then(|i| i.as_str())
        .ok_or_else(|| KilnError::GenerationError("no image in server response".to_string()))?;

    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| KilnError::GenerationError(format!("invalid image encoding: {}", e)))?;
    let pixels = bytes_to_pixels(&bytes);

    if pixels.len() != size.area() {
        return Err(KilnError::GenerationError(format!(
            "server returned {} pixels for a {} image",
            pixels.len(),
            size
        )));
    }

    Ok((pixels, size))
}

impl GenerativeBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    fn init_model(
        &self,
        options: &ModelOptions,
        allow_unsafe_content: bool,
        padding_mode: PaddingMode,
    ) -> bool {
        let payload = serde_json::json!({
            "model_id": options.model_id,
            "revision": options.revision,
            "layers": options.layers,
            "allow_unsafe_content": allow_unsafe_content,
            "padding_mode": padding_mode,
        });

        match self.post_json_with_retry(&self.endpoint("/model/load"), &payload) {
            Ok(response) => response
                .get("loaded")
                .and_then(|l| l.as_bool())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn release_model(&self) {
        let _ = self.post_json_with_retry(&self.endpoint("/model/unload"), &serde_json::json!({}));
    }

    fn generate(&self, input: &GenerationInput) -> ImageResult {
        let payload = build_generate_payload(input);

        match self
            .post_json_with_retry(&self.endpoint("/generate"), &payload)
            .and_then(|response| parse_image_response(&response))
        {
            Ok((pixels, size)) => ImageResult::completed(pixels, size, input.options.clone()),
            Err(e) => ImageResult::failed(input.options.clone(), e.to_string()),
        }
    }

    fn upsample(&self, result: &ImageResult) -> ImageResult {
        if result.is_failure() {
            return ImageResult::failed(result.options.clone(), "cannot upsample a failed result");
        }

        let payload = serde_json::json!({
            "image": BASE64.encode(pixels_to_bytes(&result.pixels)),
            "width": result.size.width,
            "height": result.size.height,
        });

        match self
            .post_json_with_retry(&self.endpoint("/upsample"), &payload)
            .and_then(|response| parse_image_response(&response))
        {
            Ok((pixels, size)) => ImageResult {
                pixels,
                size,
                options: result.options.clone(),
                upsampled: true,
                completed: true,
                error: None,
            },
            Err(e) => ImageResult::failed(result.options.clone(), e.to_string()),
        }
    }

    fn stop_generation(&self) {
        // Best-effort: the server may have already finished
        let _ = self.post_json_with_retry(&self.endpoint("/interrupt"), &serde_json::json!({}));
    }

    fn set_progress_sender(&self, sender: Sender<ProgressUpdate>) {
        // The HTTP server does not stream step previews; the sender is kept
        // so a streaming transport can be added without changing callers.
        *self.progress.lock().unwrap() = Some(sender);
    }

    fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn login_with_token(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let payload = serde_json::json!({ "token": token });
        let accepted = match self.post_json_with_retry(&self.endpoint("/login"), &payload) {
            Ok(response) => response.get("ok").and_then(|o| o.as_bool()).unwrap_or(false),
            Err(_) => false,
        };
        if accepted {
            *self.token.lock().unwrap() = Some(token.to_string());
        }
        accepted
    }
}
