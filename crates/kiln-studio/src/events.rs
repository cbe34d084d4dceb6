//! Event bus for broadcasting studio events

use crate::preview::CameraSnapshot;
use kiln_core::{FrameSize, Rgba8};
use kiln_gen::ImageResult;

/// Events the studio broadcasts to the UI/editor layer
#[derive(Debug, Clone)]
pub enum StudioEvent {
    /// A backend was created and attached
    BackendLoaded { name: String },
    /// Model initialization finished (true on success)
    ModelInitialised(bool),
    /// One step of backend progress
    Progress {
        step: u32,
        timestep: i32,
        progress: f32,
        size: FrameSize,
        pixels: Vec<Rgba8>,
    },
    /// A generation cycle finished, successfully or not
    GenerationComplete(ImageResult),
    /// An upsample cycle finished, successfully or not
    UpsampleComplete(ImageResult),
    /// The tracked camera settled after movement
    LivePreviewCameraUpdate(CameraSnapshot),
}

/// A simple event queue the studio pushes to and the UI drains
pub struct EventBus {
    events: Vec<StudioEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Push an event onto the bus
    pub fn push(&mut self, event: StudioEvent) {
        self.events.push(event);
    }

    /// Drain all events from the bus, returning them
    pub fn drain(&mut self) -> Vec<StudioEvent> {
        std::mem::take(&mut self.events)
    }

    /// Check if there are pending events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.events.len()
    }
}
