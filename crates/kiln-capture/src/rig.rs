//! Transient scene-capture rigs mirroring the editor camera
//!
//! A rig is a capture component spawned for the duration of one capture
//! cycle (or one live preview session), kept in sync with the viewport it
//! mirrors. `destroy` consumes the rig, so a rig can neither be destroyed
//! twice nor used after destruction.

use crate::component::{CaptureComponent, CaptureSettings};
use crate::host::{first_perspective_viewport, EditorHost};

/// A spawned capture component plus the viewport client it mirrors
pub struct SceneCaptureRig {
    capture: Box<dyn CaptureComponent>,
    viewport_index: usize,
}

impl SceneCaptureRig {
    pub fn capture(&self) -> &dyn CaptureComponent {
        self.capture.as_ref()
    }

    pub fn capture_mut(&mut self) -> &mut dyn CaptureComponent {
        self.capture.as_mut()
    }

    /// Index of the mirrored viewport client
    pub fn viewport_index(&self) -> usize {
        self.viewport_index
    }

    /// Destroy the spawned capture component. Consumes the rig.
    pub fn destroy(self, host: &mut dyn EditorHost) {
        host.destroy_capture(self.capture);
    }
}

/// Spawn a capture rig mirroring the first perspective viewport.
///
/// Returns `None` when no perspective viewport exists - a disabled-feature
/// state for the caller to check, not an error.
pub fn create_rig(host: &mut dyn EditorHost) -> Option<SceneCaptureRig> {
    let viewport = first_perspective_viewport(host)?;

    let mut capture = host.spawn_capture();
    capture.apply_settings(&CaptureSettings::default());
    capture.set_pose(viewport.pose);

    Some(SceneCaptureRig {
        capture,
        viewport_index: viewport.index,
    })
}

/// Copy the mirrored viewport's location, rotation and FOV onto the rig's
/// capture component. No-op when the viewport is gone.
pub fn update_rig(rig: &mut SceneCaptureRig, host: &dyn EditorHost) {
    let Some(viewport) = host
        .viewports()
        .into_iter()
        .find(|v| v.index == rig.viewport_index)
    else {
        return;
    };
    rig.capture.set_pose(viewport.pose);
}
