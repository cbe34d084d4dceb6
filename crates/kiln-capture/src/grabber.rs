//! One-shot viewport frame grabbing
//!
//! The grabber is split across the two threads that touch it. The main thread
//! holds a [`FrameGrabber`] and arms one-shot capture requests; the render
//! loop holds the matching [`FrameTap`] and feeds it the raw color buffer of
//! every rendered frame. Control flows through a channel, pixel data never
//! does - the armed payload's callback copies what it needs out of the raw
//! buffer and returns, keeping the render thread free of blocking work.

use kiln_core::{FrameSize, KilnError, Result, Rgba8};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

/// Callback invoked on the render thread with the raw color buffer, the
/// buffer's actual dimensions, and the requested target dimensions. The
/// buffer slice is only valid for the duration of the call.
pub type FrameCallback = Box<dyn FnOnce(&[Rgba8], FrameSize, FrameSize) + Send>;

/// A one-shot delivery token for a single captured frame.
///
/// Fires its notification exactly once, then is consumed. A payload cancelled
/// by [`FrameGrabber::stop_capturing_frames`] never fires.
pub struct FramePayload {
    target_size: FrameSize,
    on_frame: FrameCallback,
    in_flight: Arc<AtomicBool>,
}

impl FramePayload {
    fn fire(self, buffer: &[Rgba8], buffer_size: FrameSize) {
        self.in_flight.store(false, Ordering::Release);
        (self.on_frame)(buffer, buffer_size, self.target_size);
    }

    fn cancel(self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

enum TapControl {
    Start,
    Stop,
    Arm(FramePayload),
}

/// Main-thread control half of the grabber pair
pub struct FrameGrabber {
    control_tx: Sender<TapControl>,
    in_flight: Arc<AtomicBool>,
    capturing: bool,
}

/// Render-thread half of the grabber pair.
///
/// The host render loop calls [`FrameTap::on_frame_rendered`] once per frame
/// with the frame's raw color buffer.
pub struct FrameTap {
    control_rx: Receiver<TapControl>,
    armed: Option<FramePayload>,
    active: bool,
}

impl FrameGrabber {
    /// Create a connected grabber/tap pair
    pub fn new() -> (FrameGrabber, FrameTap) {
        let (control_tx, control_rx) = channel();
        (
            FrameGrabber {
                control_tx,
                in_flight: Arc::new(AtomicBool::new(false)),
                capturing: false,
            },
            FrameTap {
                control_rx,
                armed: None,
                active: false,
            },
        )
    }

    /// Begin continuous frame interception on the tap
    pub fn start_capturing_frames(&mut self) {
        if self.control_tx.send(TapControl::Start).is_ok() {
            self.capturing = true;
        }
    }

    /// Halt frame interception. Any armed payload is cancelled and will not
    /// fire. Leaving interception running after a capture costs a check per
    /// rendered frame, so callers stop it once their frame has arrived.
    pub fn stop_capturing_frames(&mut self) {
        let _ = self.control_tx.send(TapControl::Stop);
        self.capturing = false;
    }

    /// Whether interception has been started and not stopped
    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Arm a one-shot request: the next rendered frame invokes `on_frame`
    /// with the raw buffer, its dimensions and `target_size`, then the
    /// request is consumed.
    ///
    /// Returns `Err(KilnError::CaptureInFlight)` while a previous request is
    /// still pending - at most one grab may be armed at a time.
    pub fn capture_this_frame(
        &mut self,
        target_size: FrameSize,
        on_frame: FrameCallback,
    ) -> Result<()> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(KilnError::CaptureInFlight);
        }

        let payload = FramePayload {
            target_size,
            on_frame,
            in_flight: Arc::clone(&self.in_flight),
        };

        if self.control_tx.send(TapControl::Arm(payload)).is_err() {
            self.in_flight.store(false, Ordering::Release);
            return Err(KilnError::CaptureError(
                "frame tap is no longer attached to a render loop".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether an armed request has not yet been delivered or cancelled
    pub fn has_pending_capture(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl FrameTap {
    /// Feed one rendered frame to the tap. Called by the render loop with the
    /// raw color buffer of the frame just produced; must not block.
    pub fn on_frame_rendered(&mut self, buffer: &[Rgba8], buffer_size: FrameSize) {
        self.drain_control();

        if !self.active {
            return;
        }
        if let Some(payload) = self.armed.take() {
            payload.fire(buffer, buffer_size);
        }
    }

    fn drain_control(&mut self) {
        while let Ok(msg) = self.control_rx.try_recv() {
            match msg {
                TapControl::Start => self.active = true,
                TapControl::Stop => {
                    self.active = false;
                    if let Some(payload) = self.armed.take() {
                        payload.cancel();
                    }
                }
                TapControl::Arm(payload) => self.armed = Some(payload),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel as result_channel;

    fn frame(size: FrameSize) -> Vec<Rgba8> {
        vec![Rgba8::new(10, 20, 30, 255); size.area()]
    }

    #[test]
    fn test_exactly_one_notification_per_arm() {
        let (mut grabber, mut tap) = FrameGrabber::new();
        let (tx, rx) = result_channel();

        grabber.start_capturing_frames();
        grabber
            .capture_this_frame(
                FrameSize::new(4, 4),
                Box::new(move |pixels, buffer_size, target_size| {
                    tx.send((pixels.to_vec(), buffer_size, target_size)).unwrap();
                }),
            )
            .unwrap();

        let size = FrameSize::new(8, 8);
        let buffer = frame(size);
        tap.on_frame_rendered(&buffer, size);
        tap.on_frame_rendered(&buffer, size);
        tap.on_frame_rendered(&buffer, size);

        let (pixels, buffer_size, target_size) = rx.try_recv().unwrap();
        assert_eq!(pixels.len(), size.area());
        assert_eq!(buffer_size, size);
        assert_eq!(target_size, FrameSize::new(4, 4));

        // One arm, one notification
        assert!(rx.try_recv().is_err());
        assert!(!grabber.has_pending_capture());
    }

    #[test]
    fn test_no_notification_before_start() {
        let (mut grabber, mut tap) = FrameGrabber::new();
        let (tx, rx) = result_channel();

        grabber
            .capture_this_frame(
                FrameSize::new(2, 2),
                Box::new(move |_, _, _| tx.send(()).unwrap()),
            )
            .unwrap();

        let size = FrameSize::new(2, 2);
        tap.on_frame_rendered(&frame(size), size);
        assert!(rx.try_recv().is_err());

        // Once interception starts, the armed request delivers
        grabber.start_capturing_frames();
        tap.on_frame_rendered(&frame(size), size);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_no_notification_after_stop() {
        let (mut grabber, mut tap) = FrameGrabber::new();
        let (tx, rx) = result_channel();

        grabber.start_capturing_frames();
        grabber
            .capture_this_frame(
                FrameSize::new(2, 2),
                Box::new(move |_, _, _| tx.send(()).unwrap()),
            )
            .unwrap();
        grabber.stop_capturing_frames();

        let size = FrameSize::new(2, 2);
        tap.on_frame_rendered(&frame(size), size);
        assert!(rx.try_recv().is_err());
        // Cancelled request releases the in-flight guard
        assert!(!grabber.has_pending_capture());
    }

    #[test]
    fn test_start_stop_start_yields_one_frame_per_arm() {
        let (mut grabber, mut tap) = FrameGrabber::new();
        let size = FrameSize::new(2, 2);

        for _ in 0..2 {
            let (tx, rx) = result_channel();
            grabber.start_capturing_frames();
            grabber
                .capture_this_frame(size, Box::new(move |_, _, _| tx.send(()).unwrap()))
                .unwrap();

            tap.on_frame_rendered(&frame(size), size);
            tap.on_frame_rendered(&frame(size), size);
            assert_eq!(rx.try_iter().count(), 1);

            grabber.stop_capturing_frames();
            tap.on_frame_rendered(&frame(size), size);
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_arming_while_pending_is_rejected() {
        let (mut grabber, _tap) = FrameGrabber::new();
        grabber.start_capturing_frames();

        grabber
            .capture_this_frame(FrameSize::new(2, 2), Box::new(|_, _, _| {}))
            .unwrap();
        let second = grabber.capture_this_frame(FrameSize::new(2, 2), Box::new(|_, _, _| {}));
        assert!(matches!(second, Err(KilnError::CaptureInFlight)));
    }

    #[test]
    fn test_arm_after_tap_dropped_errors() {
        let (mut grabber, tap) = FrameGrabber::new();
        drop(tap);
        let result = grabber.capture_this_frame(FrameSize::new(2, 2), Box::new(|_, _, _| {}));
        assert!(matches!(result, Err(KilnError::CaptureError(_))));
        assert!(!grabber.has_pending_capture());
    }
}
