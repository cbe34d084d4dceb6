//! Editor host seam
//!
//! The orchestrator never reaches into global editor state. Everything it
//! needs from the host environment - viewport enumeration, capture actor
//! spawning, viewport decoration toggles - comes through [`EditorHost`],
//! passed in at construction so the pipeline is testable without a live
//! editor.

use crate::component::CaptureComponent;
use kiln_core::{CameraPose, FrameSize};

/// Projection type of a viewport client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportKind {
    Perspective,
    Orthographic,
}

/// Value snapshot of one viewport client, taken at call time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSnapshot {
    pub index: usize,
    pub kind: ViewportKind,
    pub pose: CameraPose,
    pub size: FrameSize,
}

impl ViewportSnapshot {
    pub fn is_perspective(&self) -> bool {
        self.kind == ViewportKind::Perspective
    }
}

/// Host environment surface needed by the capture and generation pipeline
pub trait EditorHost {
    /// Snapshots of all live viewport clients, in host order
    fn viewports(&self) -> Vec<ViewportSnapshot>;

    /// The viewport frames are currently grabbed from, if any
    fn active_viewport(&self) -> Option<ViewportSnapshot>;

    /// Spawn a new capture component in the scene
    fn spawn_capture(&mut self) -> Box<dyn CaptureComponent>;

    /// Destroy a previously spawned capture component
    fn destroy_capture(&mut self, capture: Box<dyn CaptureComponent>);

    /// Toggle undecorated game-view rendering; returns the previous state
    fn set_game_view(&mut self, enabled: bool) -> bool;

    /// Toggle on-screen diagnostic messages; returns the previous state
    fn set_screen_messages(&mut self, enabled: bool) -> bool;
}

/// First perspective viewport in host order, if any
pub fn first_perspective_viewport(host: &dyn EditorHost) -> Option<ViewportSnapshot> {
    host.viewports().into_iter().find(|v| v.is_perspective())
}
