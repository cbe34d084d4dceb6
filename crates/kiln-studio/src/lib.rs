//! Kiln Studio - the generation orchestrator
//!
//! Ties the capture pipeline to a generative backend: chooses the capture
//! source, drives the layer pipeline, hands composed input to the backend on
//! a background worker, and marshals results back to the owning thread where
//! completion events are broadcast. Also owns live-preview camera tracking
//! with debounced updates.

pub mod events;
pub mod preview;
pub mod studio;

pub use events::{EventBus, StudioEvent};
pub use preview::{CameraSnapshot, LivePreviewTracker, PreviewSource};
pub use studio::{CaptureSource, GenerationStudio};
