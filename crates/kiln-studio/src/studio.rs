//! Generation orchestrator
//!
//! `GenerationStudio` owns all generation state and must live on the thread
//! that owns editor/viewport state. Backend calls run on background worker
//! threads and report back through a channel; `pump` drains that channel on
//! the owning thread, clears in-flight flags and broadcasts events. Nothing
//! here is guarded by a lock - mutation is confined to the owning thread and
//! data crosses thread boundaries by value.

use crate::events::{EventBus, StudioEvent};
use crate::preview::{CameraSnapshot, LivePreviewTracker, PreviewSource};
use kiln_capture::{
    copy_frame_region, create_rig, update_rig, CaptureComponent, EditorHost, FrameGrabber,
    FrameTap, LayerData, LayerKind, LayerProcessor, LayerSpec, SceneCaptureRig,
};
use kiln_core::{FrameSize, KilnError, Result, Rgba8};
use kiln_gen::{
    GenerationInput, GenerativeBackend, ImageResult, KilnConfig, ModelOptions, PaddingMode,
    ProgressUpdate,
};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where a generation's input pixels come from
pub enum CaptureSource<'a> {
    /// The live interactive viewport: derived layers render through a
    /// transient scene-capture rig, the final color comes from a one-shot
    /// frame grab of the real viewport image
    Viewport,
    /// An offscreen scene capture, isolated from any UI. With `None` the
    /// studio creates and owns a transient rig; a caller-supplied component
    /// is borrowed for the capture and never destroyed here.
    SceneCapture {
        component: Option<&'a mut dyn CaptureComponent>,
    },
}

enum WorkerMsg {
    ModelInitialised {
        ok: bool,
        options: ModelOptions,
    },
    GenerationFinished {
        epoch: u64,
        result: ImageResult,
    },
    UpsampleFinished {
        result: ImageResult,
    },
    ViewportFrame {
        pixels: Vec<Rgba8>,
        size: FrameSize,
    },
}

/// The top-level generation controller
pub struct GenerationStudio {
    host: Box<dyn EditorHost>,
    backend: Option<Arc<dyn GenerativeBackend>>,
    model_options: Option<ModelOptions>,
    model_initialised: bool,
    is_generating: bool,
    is_upsampling: bool,
    /// Bumped at every generation start and stop; completion messages
    /// carrying a stale epoch belong to a cancelled cycle and are dropped
    generation_epoch: u64,
    worker_tx: Sender<WorkerMsg>,
    worker_rx: Receiver<WorkerMsg>,
    progress_tx: Sender<ProgressUpdate>,
    progress_rx: Receiver<ProgressUpdate>,
    grabber: FrameGrabber,
    /// Viewport-source input parked while its frame grab is in flight
    pending_input: Option<GenerationInput>,
    events: EventBus,
    tracker: LivePreviewTracker,
    preview_layer: Option<Box<dyn LayerProcessor>>,
    preview_rig: Option<SceneCaptureRig>,
}

impl GenerationStudio {
    /// Create a studio bound to an editor host. The returned [`FrameTap`]
    /// goes to the host's render loop.
    pub fn new(host: Box<dyn EditorHost>) -> (Self, FrameTap) {
        let (worker_tx, worker_rx) = channel();
        let (progress_tx, progress_rx) = channel();
        let (grabber, tap) = FrameGrabber::new();

        let studio = Self {
            host,
            backend: None,
            model_options: None,
            model_initialised: false,
            is_generating: false,
            is_upsampling: false,
            generation_epoch: 0,
            worker_tx,
            worker_rx,
            progress_tx,
            progress_rx,
            grabber,
            pending_input: None,
            events: EventBus::new(),
            tracker: LivePreviewTracker::new(),
            preview_layer: None,
            preview_rig: None,
        };
        (studio, tap)
    }

    // --- Backend lifecycle ---

    /// Attach a backend instance directly
    pub fn set_backend(&mut self, backend: Arc<dyn GenerativeBackend>) {
        let name = backend.name().to_string();
        self.backend = Some(backend);
        self.events.push(StudioEvent::BackendLoaded { name });
    }

    /// Create and attach a backend from the registry
    pub fn load_backend(&mut self, name: &str, config: &KilnConfig) -> Result<()> {
        let backend = kiln_gen::create_backend(name, config)?;
        self.set_backend(backend);
        Ok(())
    }

    pub fn is_backend_loaded(&self) -> bool {
        self.backend.is_some()
    }

    /// Load a model on the backend. With `async_init` the (potentially slow)
    /// load runs on a worker thread; either way the outcome arrives through
    /// `pump` as a `ModelInitialised` event, and the options are retained
    /// only on success.
    pub fn init_model(
        &mut self,
        options: ModelOptions,
        allow_unsafe_content: bool,
        padding_mode: PaddingMode,
        async_init: bool,
    ) {
        let Some(backend) = self.backend.as_ref().map(Arc::clone) else {
            return;
        };
        backend.set_progress_sender(self.progress_tx.clone());

        let tx = self.worker_tx.clone();
        if async_init {
            std::thread::spawn(move || {
                let ok = backend.init_model(&options, allow_unsafe_content, padding_mode);
                let _ = tx.send(WorkerMsg::ModelInitialised { ok, options });
            });
        } else {
            let ok = backend.init_model(&options, allow_unsafe_content, padding_mode);
            let _ = tx.send(WorkerMsg::ModelInitialised { ok, options });
        }
    }

    /// Unload the active model
    pub fn release_model(&mut self) {
        if let Some(backend) = &self.backend {
            backend.release_model();
            self.model_initialised = false;
            self.model_options = None;
        }
    }

    pub fn model_initialised(&self) -> bool {
        self.model_initialised
    }

    pub fn model_options(&self) -> Option<&ModelOptions> {
        self.model_options.as_ref()
    }

    pub fn has_token(&self) -> bool {
        self.backend
            .as_ref()
            .and_then(|b| b.token())
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }

    pub fn token(&self) -> Option<String> {
        self.backend.as_ref().and_then(|b| b.token())
    }

    pub fn login_with_token(&self, token: &str) -> bool {
        self.backend
            .as_ref()
            .map(|b| b.login_with_token(token))
            .unwrap_or(false)
    }

    // --- Generation ---

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn is_upsampling(&self) -> bool {
        self.is_upsampling
    }

    /// Capture the chosen source and hand the composed input to the backend.
    ///
    /// A silent no-op without a backend (the feature is simply disabled) and
    /// while a generation is already in flight. The flag flips before any
    /// capture work so repeated calls observe the in-flight state. Viewport
    /// decorations are suppressed for the duration of capture and restored
    /// on every exit path; a capture failure returns to idle through the
    /// normal completion broadcast, carrying the error.
    pub fn generate_image(&mut self, input: GenerationInput, source: CaptureSource<'_>) {
        if self.backend.is_none() || self.is_generating {
            return;
        }
        self.is_generating = true;
        self.generation_epoch += 1;

        let options = input.options.clone();
        let prev_messages = self.host.set_screen_messages(false);
        let prev_game_view = self.host.set_game_view(true);

        let outcome = match source {
            CaptureSource::Viewport => self.capture_from_viewport(input),
            CaptureSource::SceneCapture { component } => {
                self.capture_from_scene_capture(input, component)
            }
        };

        self.host.set_game_view(prev_game_view);
        self.host.set_screen_messages(prev_messages);

        if let Err(e) = outcome {
            self.is_generating = false;
            self.events.push(StudioEvent::GenerationComplete(ImageResult::failed(
                options,
                e.to_string(),
            )));
        }
    }

    /// Forward cancellation to the backend and return to idle immediately.
    /// Cancellation is cooperative: the backend call may still run to
    /// completion, but its result belongs to a dead epoch and is discarded.
    pub fn stop_generating_image(&mut self) {
        let Some(backend) = &self.backend else {
            return;
        };
        backend.stop_generation();
        self.generation_epoch += 1;
        self.is_generating = false;
        if self.pending_input.take().is_some() {
            self.grabber.stop_capturing_frames();
        }
    }

    /// Upsample a previous result on a background worker. Independent of the
    /// generation flag; at most one upsample in flight.
    pub fn upsample_image(&mut self, result: ImageResult) {
        let Some(backend) = self.backend.as_ref().map(Arc::clone) else {
            return;
        };
        if self.is_upsampling {
            return;
        }
        self.is_upsampling = true;

        let tx = self.worker_tx.clone();
        std::thread::spawn(move || {
            let upsampled = backend.upsample(&result);
            let _ = tx.send(WorkerMsg::UpsampleFinished { result: upsampled });
        });
    }

    fn capture_from_viewport(&mut self, mut input: GenerationInput) -> Result<()> {
        let viewport = self.host.active_viewport().ok_or_else(|| {
            KilnError::CaptureError("no active viewport to capture".to_string())
        })?;
        let viewport_size = viewport.size;

        if !self.grabber.is_capturing() {
            self.grabber.start_capturing_frames();
        }

        let specs: Vec<LayerSpec> = self
            .model_options
            .as_ref()
            .map(|m| m.layers.clone())
            .unwrap_or_default();

        // Derived channels render through a transient rig; the final-color
        // slot stays empty until the grabbed frame fills it
        input.layers = Vec::with_capacity(specs.len());
        if !specs.is_empty() {
            let mut rig = create_rig(self.host.as_mut()).ok_or_else(|| {
                KilnError::CaptureError("no perspective viewport for scene capture".to_string())
            })?;

            let mut failure = None;
            for spec in &specs {
                let mut processor = spec.create_processor();
                if processor.kind() == LayerKind::FinalColor {
                    input
                        .layers
                        .push(LayerData::empty(processor, viewport_size));
                    continue;
                }
                match run_layer_cycle(processor.as_mut(), viewport_size, rig.capture_mut()) {
                    Ok(pixels) => input.layers.push(LayerData {
                        processor,
                        pixels,
                        size: viewport_size,
                    }),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            rig.destroy(self.host.as_mut());
            if let Some(e) = failure {
                return Err(e);
            }
        }

        let tx = self.worker_tx.clone();
        self.grabber.capture_this_frame(
            viewport_size,
            Box::new(move |pixels, buffer_size, target_size| {
                // Render-thread context: copy the region out and return
                let copied = copy_frame_region(target_size, buffer_size, pixels);
                let _ = tx.send(WorkerMsg::ViewportFrame {
                    pixels: copied,
                    size: target_size,
                });
            }),
        )?;

        self.pending_input = Some(input);
        Ok(())
    }

    fn capture_from_scene_capture(
        &mut self,
        mut input: GenerationInput,
        component: Option<&mut dyn CaptureComponent>,
    ) -> Result<()> {
        let specs: Vec<LayerSpec> = self
            .model_options
            .as_ref()
            .map(|m| m.layers.clone())
            .unwrap_or_default();
        let viewport_size = self.host.active_viewport().map(|v| v.size);

        match component {
            Some(capture) => {
                let size = capture
                    .fixed_target_size()
                    .or(viewport_size)
                    .ok_or_else(|| {
                        KilnError::CaptureError(
                            "no render target or viewport to derive a capture size from"
                                .to_string(),
                        )
                    })?;
                input.layers = kiln_capture::process_layers(&specs, size, capture)?;
                input.options.in_size = size;
            }
            None => {
                let mut rig = create_rig(self.host.as_mut()).ok_or_else(|| {
                    KilnError::CaptureError(
                        "no perspective viewport for scene capture".to_string(),
                    )
                })?;
                let mirrored_size = self
                    .host
                    .viewports()
                    .into_iter()
                    .find(|v| v.index == rig.viewport_index())
                    .map(|v| v.size);
                let size = match mirrored_size.or(viewport_size) {
                    Some(size) => size,
                    None => {
                        rig.destroy(self.host.as_mut());
                        return Err(KilnError::CaptureError(
                            "no viewport to derive a capture size from".to_string(),
                        ));
                    }
                };

                let captured = kiln_capture::process_layers(&specs, size, rig.capture_mut());
                rig.destroy(self.host.as_mut());
                input.layers = captured?;
                input.options.in_size = size;
            }
        }

        self.start_image_generation(input);
        Ok(())
    }

    /// Hand the composed input to the backend on a background worker. The
    /// completion message comes back tagged with the current epoch.
    fn start_image_generation(&mut self, input: GenerationInput) {
        let Some(backend) = self.backend.as_ref().map(Arc::clone) else {
            self.is_generating = false;
            return;
        };
        let epoch = self.generation_epoch;
        let tx = self.worker_tx.clone();
        std::thread::spawn(move || {
            let result = backend.generate(&input);
            let _ = tx.send(WorkerMsg::GenerationFinished { epoch, result });
        });
    }

    fn finish_viewport_capture(&mut self, pixels: Vec<Rgba8>, size: FrameSize) {
        let Some(mut input) = self.pending_input.take() else {
            return;
        };

        // Frames match by layer kind, not position. Only pre-declared layers
        // receive data: without a final-color slot the frame is dropped.
        if let Some(layer) = input
            .layers
            .iter_mut()
            .find(|l| l.kind() == LayerKind::FinalColor)
        {
            layer.pixels = pixels;
            layer.size = size;
        }

        self.grabber.stop_capturing_frames();
        input.options.in_size = size;
        self.start_image_generation(input);
    }

    // --- Pump ---

    /// Drain worker results and due deadlines on the owning thread. Call once
    /// per editor tick.
    pub fn pump(&mut self) {
        while let Ok(msg) = self.worker_rx.try_recv() {
            match msg {
                WorkerMsg::ModelInitialised { ok, options } => {
                    self.model_initialised = ok;
                    if ok {
                        self.model_options = Some(options);
                    }
                    self.events.push(StudioEvent::ModelInitialised(ok));
                }
                WorkerMsg::GenerationFinished { epoch, result } => {
                    if epoch != self.generation_epoch {
                        continue;
                    }
                    self.is_generating = false;
                    self.events.push(StudioEvent::GenerationComplete(result));
                }
                WorkerMsg::UpsampleFinished { result } => {
                    self.is_upsampling = false;
                    self.events.push(StudioEvent::UpsampleComplete(result));
                }
                WorkerMsg::ViewportFrame { pixels, size } => {
                    self.finish_viewport_capture(pixels, size)
                }
            }
        }

        while let Ok(update) = self.progress_rx.try_recv() {
            self.events.push(StudioEvent::Progress {
                step: update.step,
                timestep: update.timestep,
                progress: update.progress,
                size: update.size,
                pixels: update.pixels,
            });
        }

        if let Some(snapshot) = self.tracker.poll(Instant::now()) {
            self.events
                .push(StudioEvent::LivePreviewCameraUpdate(snapshot));
        }
    }

    /// Take all pending events
    pub fn drain_events(&mut self) -> Vec<StudioEvent> {
        self.events.drain()
    }

    // --- Live preview ---

    /// Bind live-preview tracking to a notification stream. Enabling twice
    /// is a no-op.
    pub fn enable_live_preview(&mut self, delay: Duration, source: PreviewSource) {
        self.tracker.enable(delay, source);
    }

    pub fn disable_live_preview(&mut self) {
        self.tracker.disable();
    }

    pub fn live_preview_enabled(&self) -> bool {
        self.tracker.is_enabled()
    }

    /// Host hook: the global editor camera moved
    pub fn on_editor_camera_moved(&mut self, snapshot: CameraSnapshot) {
        if self.tracker.source() == Some(PreviewSource::EditorCamera) {
            self.tracker.notify(snapshot, Instant::now());
        }
        self.update_preview_rig();
    }

    /// Host hook: a tracked capture component's transform changed
    pub fn on_capture_transform_changed(&mut self, snapshot: CameraSnapshot) {
        if self.tracker.source() == Some(PreviewSource::CaptureComponent) {
            self.tracker.notify(snapshot, Instant::now());
        }
    }

    fn update_preview_rig(&mut self) {
        let Some(rig) = self.preview_rig.as_mut() else {
            return;
        };
        update_rig(rig, self.host.as_ref());
        // Keep the open layer preview live while the camera moves
        if let Some(layer) = self.preview_layer.as_mut() {
            let _ = layer.capture(rig.capture_mut());
        }
    }

    // --- Per-layer live preview ---

    /// Open a continuous preview of one layer, tearing down any previous
    /// layer preview first. The capture cycle is left open (no end-capture)
    /// so camera movement keeps refreshing it; the first captured pixels are
    /// returned for immediate display.
    ///
    /// A caller-supplied component is borrowed for this capture only and its
    /// refresh stays the caller's responsibility; with `None` the studio
    /// creates a dedicated rig it updates and destroys itself.
    pub fn set_live_preview_for_layer(
        &mut self,
        size: FrameSize,
        spec: &LayerSpec,
        component: Option<&mut dyn CaptureComponent>,
    ) -> Result<Vec<Rgba8>> {
        self.disable_live_preview_for_layer();

        let mut processor = spec.create_processor();
        let pixels = match component {
            Some(capture) => {
                processor.begin_capture(size, capture)?;
                processor.capture(capture)?;
                processor.process(capture)?
            }
            None => {
                let mut rig = create_rig(self.host.as_mut()).ok_or_else(|| {
                    KilnError::CaptureError(
                        "no perspective viewport for layer preview".to_string(),
                    )
                })?;

                let outcome = (|| {
                    processor.begin_capture(size, rig.capture_mut())?;
                    processor.capture(rig.capture_mut())?;
                    processor.process(rig.capture_mut())
                })();

                match outcome {
                    Ok(pixels) => {
                        self.preview_rig = Some(rig);
                        pixels
                    }
                    Err(e) => {
                        rig.destroy(self.host.as_mut());
                        return Err(e);
                    }
                }
            }
        };

        self.preview_layer = Some(processor);
        Ok(pixels)
    }

    /// Close the open layer preview: end the capture cycle, destroy the
    /// dedicated rig when one was created, and clear the active layer.
    pub fn disable_live_preview_for_layer(&mut self) {
        let layer = self.preview_layer.take();
        let rig = self.preview_rig.take();

        match (layer, rig) {
            (Some(mut layer), Some(mut rig)) => {
                let _ = layer.end_capture(rig.capture_mut());
                rig.destroy(self.host.as_mut());
            }
            (_, Some(rig)) => rig.destroy(self.host.as_mut()),
            _ => {}
        }
    }

    /// Read the open layer preview's current pixels for display
    pub fn layer_preview_pixels(&mut self) -> Option<Vec<Rgba8>> {
        let layer = self.preview_layer.as_mut()?;
        let rig = self.preview_rig.as_mut()?;
        layer.process(rig.capture_mut()).ok()
    }
}

fn run_layer_cycle(
    processor: &mut dyn LayerProcessor,
    size: FrameSize,
    capture: &mut dyn CaptureComponent,
) -> Result<Vec<Rgba8>> {
    processor.begin_capture(size, capture)?;
    processor.capture(capture)?;
    processor.end_capture(capture)?;
    processor.process(capture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_capture::{
        CaptureMode, CaptureSettings, DepthParams, ViewportKind, ViewportSnapshot,
    };
    use kiln_core::{CameraPose, Rotator, Vec3};
    use kiln_gen::backends::mock::MockBackend;
    use kiln_gen::GenerationOptions;
    use std::sync::Mutex;

    // --- Test doubles ---

    #[derive(Default)]
    struct HostState {
        live_captures: isize,
        total_captures: usize,
        game_view: bool,
        screen_messages: bool,
        toggles: Vec<(&'static str, bool)>,
    }

    struct TestCapture {
        mode: CaptureMode,
        size: FrameSize,
        pose: CameraPose,
        fixed_size: Option<FrameSize>,
        rendered: Option<Vec<Rgba8>>,
        state: Arc<Mutex<HostState>>,
    }

    impl TestCapture {
        fn new(state: Arc<Mutex<HostState>>) -> Self {
            Self {
                mode: CaptureMode::FinalColor,
                size: FrameSize::new(1, 1),
                pose: CameraPose::default(),
                fixed_size: None,
                rendered: None,
                state,
            }
        }

        fn standalone() -> Self {
            Self::new(Arc::new(Mutex::new(HostState::default())))
        }

        fn fill_for_mode(mode: &CaptureMode) -> Rgba8 {
            match mode {
                CaptureMode::FinalColor => Rgba8::new(200, 180, 160, 255),
                CaptureMode::Depth { .. } => Rgba8::new(90, 90, 90, 255),
                CaptureMode::WorldNormal => Rgba8::new(128, 128, 255, 255),
                CaptureMode::Mask { .. } => Rgba8::new(255, 0, 0, 255),
            }
        }
    }

    impl CaptureComponent for TestCapture {
        fn apply_settings(&mut self, _settings: &CaptureSettings) {}

        fn set_pose(&mut self, pose: CameraPose) {
            self.pose = pose;
        }

        fn pose(&self) -> CameraPose {
            self.pose
        }

        fn set_visualization(&mut self, mode: CaptureMode) {
            self.mode = mode;
        }

        fn visualization(&self) -> CaptureMode {
            self.mode.clone()
        }

        fn fixed_target_size(&self) -> Option<FrameSize> {
            self.fixed_size
        }

        fn resize_target(&mut self, size: FrameSize) -> Result<()> {
            if size.is_empty() {
                return Err(KilnError::RenderError("zero-sized target".to_string()));
            }
            self.size = size;
            Ok(())
        }

        fn target_size(&self) -> FrameSize {
            self.size
        }

        fn capture(&mut self) -> Result<()> {
            self.state.lock().unwrap().total_captures += 1;
            self.rendered = Some(vec![Self::fill_for_mode(&self.mode); self.size.area()]);
            Ok(())
        }

        fn read_pixels(&mut self) -> Result<Vec<Rgba8>> {
            self.rendered
                .clone()
                .ok_or_else(|| KilnError::RenderError("nothing captured yet".to_string()))
        }
    }

    struct TestHost {
        viewports: Vec<ViewportSnapshot>,
        state: Arc<Mutex<HostState>>,
    }

    impl TestHost {
        fn with_perspective(size: FrameSize) -> (Self, Arc<Mutex<HostState>>) {
            let state = Arc::new(Mutex::new(HostState {
                screen_messages: true,
                ..Default::default()
            }));
            let host = Self {
                viewports: vec![ViewportSnapshot {
                    index: 0,
                    kind: ViewportKind::Perspective,
                    pose: CameraPose::new(
                        Vec3::new(0.0, 2.0, -10.0),
                        Rotator::new(0.0, 0.0, 0.0),
                        60.0,
                    ),
                    size,
                }],
                state: Arc::clone(&state),
            };
            (host, state)
        }

        fn empty() -> (Self, Arc<Mutex<HostState>>) {
            let state = Arc::new(Mutex::new(HostState {
                screen_messages: true,
                ..Default::default()
            }));
            let host = Self {
                viewports: Vec::new(),
                state: Arc::clone(&state),
            };
            (host, state)
        }
    }

    impl EditorHost for TestHost {
        fn viewports(&self) -> Vec<ViewportSnapshot> {
            self.viewports.clone()
        }

        fn active_viewport(&self) -> Option<ViewportSnapshot> {
            self.viewports.first().copied()
        }

        fn spawn_capture(&mut self) -> Box<dyn CaptureComponent> {
            self.state.lock().unwrap().live_captures += 1;
            Box::new(TestCapture::new(Arc::clone(&self.state)))
        }

        fn destroy_capture(&mut self, _capture: Box<dyn CaptureComponent>) {
            self.state.lock().unwrap().live_captures -= 1;
        }

        fn set_game_view(&mut self, enabled: bool) -> bool {
            let mut state = self.state.lock().unwrap();
            let prev = state.game_view;
            state.game_view = enabled;
            state.toggles.push(("game_view", enabled));
            prev
        }

        fn set_screen_messages(&mut self, enabled: bool) -> bool {
            let mut state = self.state.lock().unwrap();
            let prev = state.screen_messages;
            state.screen_messages = enabled;
            state.toggles.push(("screen_messages", enabled));
            prev
        }
    }

    #[derive(Default)]
    struct RecordedInput {
        layer_kinds: Vec<LayerKind>,
        layer_pixel_counts: Vec<usize>,
        final_color_first_pixel: Option<Rgba8>,
        options: Option<GenerationOptions>,
    }

    /// Backend that records what it was handed and completes after a delay
    struct RecordingBackend {
        record: Arc<Mutex<RecordedInput>>,
        delay: Duration,
    }

    impl RecordingBackend {
        fn new(delay: Duration) -> (Self, Arc<Mutex<RecordedInput>>) {
            let record = Arc::new(Mutex::new(RecordedInput::default()));
            (
                Self {
                    record: Arc::clone(&record),
                    delay,
                },
                record,
            )
        }
    }

    impl GenerativeBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        fn init_model(
            &self,
            _options: &ModelOptions,
            _allow_unsafe_content: bool,
            _padding_mode: PaddingMode,
        ) -> bool {
            true
        }

        fn release_model(&self) {}

        fn generate(&self, input: &GenerationInput) -> ImageResult {
            {
                let mut record = self.record.lock().unwrap();
                record.layer_kinds = input.layers.iter().map(|l| l.kind()).collect();
                record.layer_pixel_counts = input.layers.iter().map(|l| l.pixels.len()).collect();
                record.final_color_first_pixel = input
                    .layers
                    .iter()
                    .find(|l| l.kind() == LayerKind::FinalColor)
                    .and_then(|l| l.pixels.first().copied());
                record.options = Some(input.options.clone());
            }
            std::thread::sleep(self.delay);
            let size = input.options.in_size;
            ImageResult::completed(
                vec![Rgba8::new(5, 5, 5, 255); size.area()],
                size,
                input.options.clone(),
            )
        }

        fn upsample(&self, result: &ImageResult) -> ImageResult {
            std::thread::sleep(self.delay);
            let mut upsampled = result.clone();
            upsampled.upsampled = true;
            upsampled
        }

        fn stop_generation(&self) {}

        fn set_progress_sender(&self, _sender: std::sync::mpsc::Sender<ProgressUpdate>) {}

        fn token(&self) -> Option<String> {
            None
        }

        fn login_with_token(&self, _token: &str) -> bool {
            true
        }
    }

    // --- Helpers ---

    fn pump_until(studio: &mut GenerationStudio, mut done: impl FnMut(&GenerationStudio) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(studio) {
            assert!(Instant::now() < deadline, "timed out waiting for studio");
            studio.pump();
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn generation_completes(events: &[StudioEvent]) -> Vec<&ImageResult> {
        events
            .iter()
            .filter_map(|e| match e {
                StudioEvent::GenerationComplete(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    fn init_studio_model(studio: &mut GenerationStudio, layers: Vec<LayerSpec>) {
        studio.init_model(
            ModelOptions::new("test-model").with_layers(layers),
            false,
            PaddingMode::Zeros,
            false,
        );
        studio.pump();
        assert!(studio.model_initialised());
    }

    fn prompt_input(prompt: &str) -> GenerationInput {
        GenerationInput::new(GenerationOptions {
            prompt: prompt.to_string(),
            seed: Some(11),
            iterations: 2,
            ..Default::default()
        })
    }

    // --- End-to-end scenarios ---

    #[test]
    fn test_viewport_source_end_to_end() {
        let size = FrameSize::new(512, 512);
        let (host, state) = TestHost::with_perspective(size);
        let (mut studio, mut tap) = GenerationStudio::new(Box::new(host));

        let (backend, record) = RecordingBackend::new(Duration::from_millis(1));
        studio.set_backend(Arc::new(backend));
        init_studio_model(
            &mut studio,
            vec![
                LayerSpec::final_color(),
                LayerSpec::depth(DepthParams::default()),
            ],
        );

        studio.generate_image(prompt_input("castle at dusk"), CaptureSource::Viewport);
        assert!(studio.is_generating());

        // The render loop produces a frame; the armed grab copies it out
        let frame_color = Rgba8::new(50, 60, 70, 255);
        tap.on_frame_rendered(&vec![frame_color; size.area()], size);

        pump_until(&mut studio, |s| !s.is_generating());

        let events = studio.drain_events();
        let completes = generation_completes(&events);
        assert_eq!(completes.len(), 1, "exactly one completion broadcast");
        let result = completes[0];
        assert!(!result.is_failure());
        assert_eq!(result.options.in_size, size);

        // The backend saw both declared layers, in order, fully populated
        let record = record.lock().unwrap();
        assert_eq!(
            record.layer_kinds,
            vec![LayerKind::FinalColor, LayerKind::Depth]
        );
        assert_eq!(record.layer_pixel_counts, vec![size.area(), size.area()]);
        // Final color came from the grabbed frame, not a scene capture
        assert_eq!(record.final_color_first_pixel, Some(frame_color));
        assert_eq!(record.options.as_ref().unwrap().in_size, size);

        let state = state.lock().unwrap();
        // Only the depth layer rendered through the transient rig
        assert_eq!(state.total_captures, 1);
        assert_eq!(state.live_captures, 0);
    }

    #[test]
    fn test_generate_without_backend_is_a_noop() {
        let (host, _state) = TestHost::with_perspective(FrameSize::new(64, 64));
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        studio.generate_image(prompt_input("nothing"), CaptureSource::Viewport);
        assert!(!studio.is_generating());

        studio.pump();
        assert!(studio.drain_events().is_empty());
    }

    #[test]
    fn test_scene_capture_source_with_transient_rig() {
        let size = FrameSize::new(128, 96);
        let (host, state) = TestHost::with_perspective(size);
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        let (backend, record) = RecordingBackend::new(Duration::from_millis(1));
        studio.set_backend(Arc::new(backend));
        init_studio_model(
            &mut studio,
            vec![LayerSpec::final_color(), LayerSpec::normal()],
        );

        studio.generate_image(
            prompt_input("ruined tower"),
            CaptureSource::SceneCapture { component: None },
        );
        // Scene capture is synchronous: the transient rig is already gone
        assert_eq!(state.lock().unwrap().live_captures, 0);

        pump_until(&mut studio, |s| !s.is_generating());
        let events = studio.drain_events();
        assert_eq!(generation_completes(&events).len(), 1);

        let record = record.lock().unwrap();
        // Final color captures like any other layer here - no frame grab
        assert_eq!(
            record.layer_kinds,
            vec![LayerKind::FinalColor, LayerKind::Normal]
        );
        assert_eq!(record.layer_pixel_counts, vec![size.area(), size.area()]);
        assert_eq!(record.options.as_ref().unwrap().in_size, size);
        assert_eq!(state.lock().unwrap().total_captures, 2);
    }

    #[test]
    fn test_caller_supplied_component_is_not_destroyed() {
        let (host, state) = TestHost::with_perspective(FrameSize::new(64, 64));
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        let (backend, record) = RecordingBackend::new(Duration::from_millis(1));
        studio.set_backend(Arc::new(backend));
        init_studio_model(&mut studio, vec![LayerSpec::final_color()]);

        let mut component = TestCapture::standalone();
        component.fixed_size = Some(FrameSize::new(256, 256));

        studio.generate_image(
            prompt_input("courtyard"),
            CaptureSource::SceneCapture {
                component: Some(&mut component),
            },
        );
        pump_until(&mut studio, |s| !s.is_generating());

        // The studio never spawned or destroyed anything
        assert_eq!(state.lock().unwrap().live_captures, 0);
        // Capture size came from the component's fixed render target
        let record = record.lock().unwrap();
        assert_eq!(
            record.options.as_ref().unwrap().in_size,
            FrameSize::new(256, 256)
        );
        // The borrowed component is still alive and usable
        assert!(component.capture().is_ok());
    }

    #[test]
    fn test_capture_failure_broadcasts_failed_result_and_restores_overlays() {
        let (host, state) = TestHost::empty();
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        let (backend, _record) = RecordingBackend::new(Duration::from_millis(1));
        studio.set_backend(Arc::new(backend));
        init_studio_model(&mut studio, vec![LayerSpec::final_color()]);

        studio.generate_image(prompt_input("nowhere"), CaptureSource::Viewport);
        assert!(!studio.is_generating());

        let events = studio.drain_events();
        let completes = generation_completes(&events);
        assert_eq!(completes.len(), 1);
        assert!(completes[0].is_failure());

        // Overlay state restored on the failure path too
        let state = state.lock().unwrap();
        assert!(!state.game_view);
        assert!(state.screen_messages);
    }

    #[test]
    fn test_overlays_suppressed_during_capture_and_restored_after() {
        let (host, state) = TestHost::with_perspective(FrameSize::new(32, 32));
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        let (backend, _record) = RecordingBackend::new(Duration::from_millis(1));
        studio.set_backend(Arc::new(backend));
        init_studio_model(&mut studio, vec![LayerSpec::final_color()]);

        studio.generate_image(
            prompt_input("clean frame"),
            CaptureSource::SceneCapture { component: None },
        );
        pump_until(&mut studio, |s| !s.is_generating());

        let state = state.lock().unwrap();
        assert_eq!(
            state.toggles,
            vec![
                ("screen_messages", false),
                ("game_view", true),
                ("game_view", false),
                ("screen_messages", true),
            ]
        );
        assert!(!state.game_view);
        assert!(state.screen_messages);
    }

    #[test]
    fn test_second_generate_while_in_flight_is_ignored() {
        let (host, _state) = TestHost::with_perspective(FrameSize::new(32, 32));
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        let (backend, _record) = RecordingBackend::new(Duration::from_millis(50));
        studio.set_backend(Arc::new(backend));
        init_studio_model(&mut studio, vec![LayerSpec::final_color()]);

        studio.generate_image(
            prompt_input("first"),
            CaptureSource::SceneCapture { component: None },
        );
        assert!(studio.is_generating());
        studio.generate_image(
            prompt_input("second"),
            CaptureSource::SceneCapture { component: None },
        );

        pump_until(&mut studio, |s| !s.is_generating());
        // Give a hypothetical second worker time to land, then drain
        std::thread::sleep(Duration::from_millis(80));
        studio.pump();

        let events = studio.drain_events();
        assert_eq!(generation_completes(&events).len(), 1);
    }

    #[test]
    fn test_stop_discards_late_completion() {
        let (host, _state) = TestHost::with_perspective(FrameSize::new(32, 32));
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        let (backend, _record) = RecordingBackend::new(Duration::from_millis(50));
        studio.set_backend(Arc::new(backend));
        init_studio_model(&mut studio, vec![LayerSpec::final_color()]);

        studio.generate_image(
            prompt_input("doomed"),
            CaptureSource::SceneCapture { component: None },
        );
        assert!(studio.is_generating());

        studio.stop_generating_image();
        assert!(!studio.is_generating());

        // Let the ignored worker finish, then confirm its result was dropped
        std::thread::sleep(Duration::from_millis(100));
        studio.pump();
        let events = studio.drain_events();
        assert!(generation_completes(&events).is_empty());
        assert!(!studio.is_generating());
    }

    #[test]
    fn test_upsample_end_to_end() {
        let (host, _state) = TestHost::with_perspective(FrameSize::new(32, 32));
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        let (backend, _record) = RecordingBackend::new(Duration::from_millis(1));
        studio.set_backend(Arc::new(backend));

        let source = ImageResult::completed(
            vec![Rgba8::BLACK; 16],
            FrameSize::new(4, 4),
            GenerationOptions::default(),
        );
        studio.upsample_image(source);
        assert!(studio.is_upsampling());

        pump_until(&mut studio, |s| !s.is_upsampling());
        let events = studio.drain_events();
        let upsamples: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StudioEvent::UpsampleComplete(result) => Some(result),
                _ => None,
            })
            .collect();
        assert_eq!(upsamples.len(), 1);
        assert!(upsamples[0].upsampled);
    }

    #[test]
    fn test_mock_backend_streams_progress() {
        let (host, _state) = TestHost::with_perspective(FrameSize::new(16, 16));
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        studio.set_backend(Arc::new(MockBackend::new()));
        init_studio_model(&mut studio, vec![LayerSpec::final_color()]);

        let mut input = prompt_input("mossy wall");
        input.options.iterations = 3;
        studio.generate_image(input, CaptureSource::SceneCapture { component: None });

        pump_until(&mut studio, |s| !s.is_generating());
        std::thread::sleep(Duration::from_millis(10));
        studio.pump();

        let events = studio.drain_events();
        let progress_count = events
            .iter()
            .filter(|e| matches!(e, StudioEvent::Progress { .. }))
            .count();
        assert_eq!(progress_count, 3);
        assert_eq!(generation_completes(&events).len(), 1);
        assert!(!generation_completes(&events)[0].is_failure());
    }

    #[test]
    fn test_live_preview_debounce_end_to_end() {
        let (host, _state) = TestHost::with_perspective(FrameSize::new(16, 16));
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        studio.enable_live_preview(Duration::from_millis(10), PreviewSource::EditorCamera);
        assert!(studio.live_preview_enabled());

        for x in 0..4 {
            studio.on_editor_camera_moved(CameraSnapshot::new(
                Vec3::new(x as f32, 0.0, 0.0),
                Rotator::ZERO,
                ViewportKind::Perspective,
                0,
            ));
        }

        std::thread::sleep(Duration::from_millis(20));
        studio.pump();

        let events = studio.drain_events();
        let updates: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StudioEvent::LivePreviewCameraUpdate(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].location, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_layer_preview_lifecycle() {
        let size = FrameSize::new(64, 64);
        let (host, state) = TestHost::with_perspective(size);
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        let pixels = studio
            .set_live_preview_for_layer(size, &LayerSpec::normal(), None)
            .unwrap();
        assert_eq!(pixels.len(), size.area());
        assert_eq!(state.lock().unwrap().live_captures, 1);
        let captures_after_open = state.lock().unwrap().total_captures;

        // Camera movement keeps the open preview refreshing
        studio.on_editor_camera_moved(CameraSnapshot::new(
            Vec3::new(1.0, 0.0, 0.0),
            Rotator::ZERO,
            ViewportKind::Perspective,
            0,
        ));
        assert!(state.lock().unwrap().total_captures > captures_after_open);
        assert!(studio.layer_preview_pixels().is_some());

        // Switching layers tears down the old preview first
        studio
            .set_live_preview_for_layer(size, &LayerSpec::depth(DepthParams::default()), None)
            .unwrap();
        assert_eq!(state.lock().unwrap().live_captures, 1);

        studio.disable_live_preview_for_layer();
        assert_eq!(state.lock().unwrap().live_captures, 0);
        assert!(studio.layer_preview_pixels().is_none());
    }

    #[test]
    fn test_model_release_clears_options() {
        let (host, _state) = TestHost::with_perspective(FrameSize::new(16, 16));
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        studio.set_backend(Arc::new(MockBackend::new()));
        init_studio_model(&mut studio, vec![LayerSpec::final_color()]);
        assert!(studio.model_options().is_some());

        studio.release_model();
        assert!(!studio.model_initialised());
        assert!(studio.model_options().is_none());
    }

    #[test]
    fn test_token_login_passthrough() {
        let (host, _state) = TestHost::with_perspective(FrameSize::new(16, 16));
        let (mut studio, _tap) = GenerationStudio::new(Box::new(host));

        // Without a backend every auth call is a quiet default
        assert!(!studio.has_token());
        assert!(!studio.login_with_token("tok"));

        studio.set_backend(Arc::new(MockBackend::new()));
        assert!(!studio.has_token());
        assert!(studio.login_with_token("tok-9"));
        assert!(studio.has_token());
        assert_eq!(studio.token().as_deref(), Some("tok-9"));
    }
}
