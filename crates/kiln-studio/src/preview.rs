//! Live-preview camera tracking with debounced updates
//!
//! The tracker receives camera-moved notifications, suppresses the redundant
//! ones a stationary camera still emits, and holds a single debounce
//! deadline that restarts on every real movement. The deadline is checked by
//! the studio's pump rather than a host timer, so the whole thing is
//! deterministic under test.

use kiln_capture::ViewportKind;
use kiln_core::{Rotator, Vec3};
use std::time::{Duration, Instant};

/// Last known camera state, compared by value to detect real movement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSnapshot {
    pub location: Vec3,
    pub rotation: Rotator,
    pub viewport_kind: ViewportKind,
    pub viewport_index: usize,
}

impl CameraSnapshot {
    pub fn new(
        location: Vec3,
        rotation: Rotator,
        viewport_kind: ViewportKind,
        viewport_index: usize,
    ) -> Self {
        Self {
            location,
            rotation,
            viewport_kind,
            viewport_index,
        }
    }
}

/// Which notification stream the tracker is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewSource {
    /// The global editor-camera-moved stream
    EditorCamera,
    /// A specific capture component's transform-changed stream
    CaptureComponent,
}

/// Debounced camera tracker for live preview updates
pub struct LivePreviewTracker {
    delay: Duration,
    source: Option<PreviewSource>,
    last: Option<CameraSnapshot>,
    deadline: Option<Instant>,
}

impl Default for LivePreviewTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LivePreviewTracker {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(500),
            source: None,
            last: None,
            deadline: None,
        }
    }

    /// Bind to a notification stream. Enabling while already enabled is a
    /// no-op, keeping the original subscription and delay.
    pub fn enable(&mut self, delay: Duration, source: PreviewSource) {
        if self.source.is_some() {
            return;
        }
        self.delay = delay;
        self.source = Some(source);
    }

    /// Unbind and forget the last snapshot so re-enabling starts fresh
    pub fn disable(&mut self) {
        self.source = None;
        self.last = None;
        self.deadline = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<PreviewSource> {
        self.source
    }

    /// Feed one camera-moved notification. An unchanged snapshot is ignored;
    /// a changed one restarts the debounce window from `now`.
    pub fn notify(&mut self, snapshot: CameraSnapshot, now: Instant) {
        if self.source.is_none() {
            return;
        }
        if self.last != Some(snapshot) {
            self.deadline = Some(now + self.delay);
        }
        self.last = Some(snapshot);
    }

    /// Fire the pending deadline if the camera has been still for the full
    /// delay. Returns the snapshot to broadcast at most once per settle.
    pub fn poll(&mut self, now: Instant) -> Option<CameraSnapshot> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(x: f32) -> CameraSnapshot {
        CameraSnapshot::new(
            Vec3::new(x, 0.0, 0.0),
            Rotator::ZERO,
            ViewportKind::Perspective,
            0,
        )
    }

    fn enabled_tracker(delay_ms: u64) -> LivePreviewTracker {
        let mut tracker = LivePreviewTracker::new();
        tracker.enable(
            Duration::from_millis(delay_ms),
            PreviewSource::EditorCamera,
        );
        tracker
    }

    #[test]
    fn test_single_broadcast_after_movement_settles() {
        let mut tracker = enabled_tracker(100);
        let t0 = Instant::now();

        tracker.notify(snapshot(1.0), t0);
        tracker.notify(snapshot(2.0), t0 + Duration::from_millis(30));
        tracker.notify(snapshot(3.0), t0 + Duration::from_millis(60));

        // Window is timed from the last movement, not the first
        assert!(tracker.poll(t0 + Duration::from_millis(100)).is_none());
        assert!(tracker.poll(t0 + Duration::from_millis(159)).is_none());

        let fired = tracker.poll(t0 + Duration::from_millis(160)).unwrap();
        assert_eq!(fired, snapshot(3.0));

        // Exactly one broadcast per settle
        assert!(tracker.poll(t0 + Duration::from_millis(400)).is_none());
    }

    #[test]
    fn test_unchanged_snapshot_does_not_restart_window() {
        let mut tracker = enabled_tracker(100);
        let t0 = Instant::now();

        tracker.notify(snapshot(1.0), t0);
        // Stationary camera still emitting events
        tracker.notify(snapshot(1.0), t0 + Duration::from_millis(50));
        tracker.notify(snapshot(1.0), t0 + Duration::from_millis(90));

        // Deadline stays anchored to the original movement
        let fired = tracker.poll(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(fired, snapshot(1.0));
    }

    #[test]
    fn test_stationary_after_fire_stays_quiet() {
        let mut tracker = enabled_tracker(50);
        let t0 = Instant::now();

        tracker.notify(snapshot(1.0), t0);
        assert!(tracker.poll(t0 + Duration::from_millis(50)).is_some());

        tracker.notify(snapshot(1.0), t0 + Duration::from_millis(100));
        assert!(tracker.poll(t0 + Duration::from_millis(200)).is_none());
    }

    #[test]
    fn test_enable_twice_is_noop() {
        let mut tracker = enabled_tracker(100);
        tracker.enable(Duration::from_millis(5), PreviewSource::CaptureComponent);

        assert_eq!(tracker.source(), Some(PreviewSource::EditorCamera));

        let t0 = Instant::now();
        tracker.notify(snapshot(1.0), t0);
        // Still the original 100ms window, not 5ms
        assert!(tracker.poll(t0 + Duration::from_millis(50)).is_none());
        assert!(tracker.poll(t0 + Duration::from_millis(100)).is_some());
    }

    #[test]
    fn test_disable_resets_state() {
        let mut tracker = enabled_tracker(100);
        let t0 = Instant::now();

        tracker.notify(snapshot(1.0), t0);
        tracker.disable();
        assert!(!tracker.is_enabled());
        assert!(tracker.poll(t0 + Duration::from_millis(500)).is_none());

        // Re-enabling starts fresh: the old snapshot is gone, so the same
        // pose counts as movement again
        tracker.enable(Duration::from_millis(10), PreviewSource::EditorCamera);
        tracker.notify(snapshot(1.0), t0 + Duration::from_millis(600));
        assert_eq!(
            tracker.poll(t0 + Duration::from_millis(610)),
            Some(snapshot(1.0))
        );
    }

    #[test]
    fn test_notifications_ignored_while_disabled() {
        let mut tracker = LivePreviewTracker::new();
        let t0 = Instant::now();
        tracker.notify(snapshot(1.0), t0);
        assert!(tracker.poll(t0 + Duration::from_secs(10)).is_none());
    }
}
