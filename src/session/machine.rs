//! The control-context state machine.
//!
//! Every lifecycle request, device answer and decode outcome arrives as a
//! [`ControlEvent`] on one queue and is applied here, one at a time, by the
//! control thread. Nothing else writes the machine's fields.

use super::events::{ScannerError, ScannerEvent};
use super::state::SessionState;
use super::surface::PreviewSurface;
use crate::capture::{
    select_camera, AutofocusMode, CameraError, CaptureDeviceController, CaptureRequest,
    ControllerError, DeviceEvent, DeviceTransition, OpenOutcome, ScannerConfig, StreamTarget,
};
use crate::geometry::{choose_output_size, compute_transform, OutputSize, ViewSize};
use crate::pipeline::{BackpressureGate, DecodeOutcome, FrameSource, PipelineStats, ProcessedFrame};
use std::sync::mpsc::{SendError, Sender};
use std::sync::{Arc, Mutex, PoisonError};

/// Input to the control context.
#[derive(Debug)]
pub enum ControlEvent {
    StartPreview,
    StopPreview,
    StartScanning,
    StopScanning,
    /// The rendering surface became available with the given size.
    SurfaceAvailable(ViewSize),
    /// The rendering surface changed size.
    SurfaceResized(ViewSize),
    /// Terminal answer to a device open request.
    Device(OpenOutcome),
    /// A frame finished decoding.
    FrameProcessed(ProcessedFrame),
    Shutdown,
}

impl ControlEvent {
    /// Disposes of an event that will never be applied. A device that
    /// finished opening is closed; everything else is dropped.
    pub fn discard(self) {
        if let ControlEvent::Device(OpenOutcome {
            attempt,
            event: DeviceEvent::Opened(mut device),
        }) = self
        {
            tracing::debug!(camera = %device.id(), attempt, "Closing device opened during shutdown");
            device.close();
        }
    }
}

/// Whether the control loop keeps running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Drives preview and scanning lifecycle.
pub struct SessionStateMachine {
    state: SessionState,
    /// State to fall back to when an open attempt times out.
    resume_state: SessionState,
    published: Arc<Mutex<SessionState>>,
    config: ScannerConfig,
    controller: CaptureDeviceController,
    surface: Box<dyn PreviewSurface>,
    source: Arc<FrameSource>,
    gate: BackpressureGate,
    stats: Arc<PipelineStats>,
    control_tx: Sender<ControlEvent>,
    events: Sender<ScannerEvent>,
    view: ViewSize,
    /// Set once the surface reported itself ready; it stays ready across
    /// preview restarts.
    surface_ready: bool,
    output_size: Option<OutputSize>,
    scan_requested: bool,
}

impl SessionStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ScannerConfig,
        controller: CaptureDeviceController,
        surface: Box<dyn PreviewSurface>,
        source: Arc<FrameSource>,
        gate: BackpressureGate,
        stats: Arc<PipelineStats>,
        control_tx: Sender<ControlEvent>,
        events: Sender<ScannerEvent>,
    ) -> Self {
        let view = surface.viewport();
        let surface_ready = surface.is_available();
        Self {
            state: SessionState::Idle,
            resume_state: SessionState::Idle,
            published: Arc::default(),
            config,
            controller,
            surface,
            source,
            gate,
            stats,
            control_tx,
            events,
            view,
            surface_ready,
            output_size: None,
            scan_requested: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Shared, read-only view of the current state.
    pub fn published_state(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.published)
    }

    pub fn output_size(&self) -> Option<OutputSize> {
        self.output_size
    }

    /// Applies one event.
    pub fn handle(&mut self, event: ControlEvent) -> Flow {
        let flow = match event {
            ControlEvent::StartPreview => self.start_preview(),
            ControlEvent::StopPreview => self.stop_preview(),
            ControlEvent::StartScanning => {
                self.start_scanning();
                Flow::Continue
            }
            ControlEvent::StopScanning => {
                self.stop_scanning();
                Flow::Continue
            }
            ControlEvent::SurfaceAvailable(view) => self.surface_available(view),
            ControlEvent::SurfaceResized(view) => {
                self.view = view;
                self.apply_transform();
                Flow::Continue
            }
            ControlEvent::Device(outcome) => {
                self.device_event(outcome);
                Flow::Continue
            }
            ControlEvent::FrameProcessed(processed) => {
                self.frame_processed(processed);
                Flow::Continue
            }
            ControlEvent::Shutdown => {
                self.stop_preview();
                Flow::Exit
            }
        };

        *self.published.lock().unwrap_or_else(PoisonError::into_inner) = self.state;
        flow
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "Session state changed");
            self.state = next;
        }
    }

    fn emit(&self, event: ScannerEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Scanner event receiver dropped");
        }
    }

    fn fail(&mut self, error: ScannerError, next: SessionState) {
        tracing::warn!(error = %error, "Preview failed to start");
        self.output_size = None;
        self.scan_requested = false;
        self.transition(next);
        self.emit(ScannerEvent::Error(error));
    }

    fn start_preview(&mut self) -> Flow {
        if !matches!(self.state, SessionState::Idle | SessionState::Stopped) {
            tracing::debug!(state = %self.state, "Ignoring start_preview");
            return Flow::Continue;
        }
        self.resume_state = self.state;

        if !self.surface_ready && self.surface.is_available() {
            self.view = self.surface.viewport();
            self.surface_ready = true;
        }

        if self.surface_ready {
            self.open_camera()
        } else {
            tracing::debug!("Surface not ready, waiting");
            self.transition(SessionState::PreviewPending);
            Flow::Continue
        }
    }

    fn surface_available(&mut self, view: ViewSize) -> Flow {
        self.view = view;
        self.surface_ready = true;
        if self.state == SessionState::PreviewPending {
            self.open_camera()
        } else {
            Flow::Continue
        }
    }

    fn open_camera(&mut self) -> Flow {
        let identity = match select_camera(self.controller.manager(), self.config.preferred_facing) {
            Ok(identity) => identity,
            Err(e) => {
                self.fail(e.into(), SessionState::Idle);
                return Flow::Continue;
            }
        };

        let Some(size) = choose_output_size(
            &identity.output_sizes,
            self.view.target_aspect(),
            self.config.max_output_width,
        ) else {
            self.fail(
                CameraError::NoOutputSizes(identity.id.to_string()).into(),
                SessionState::Idle,
            );
            return Flow::Continue;
        };
        tracing::info!(
            camera = %identity.id,
            width = size.width,
            height = size.height,
            "Selected output size"
        );

        self.output_size = Some(size);
        if self.view.is_landscape() {
            self.surface.set_aspect_ratio(size.width, size.height);
        } else {
            self.surface.set_aspect_ratio(size.height, size.width);
        }
        self.apply_transform();

        let control_tx = self.control_tx.clone();
        let result = self.controller.open(&identity, move |outcome| {
            // Receiver gone means the scanner shut down.
            if let Err(SendError(event)) = control_tx.send(ControlEvent::Device(outcome)) {
                event.discard();
            }
        });

        match result {
            Ok(()) => {
                self.transition(SessionState::Opening);
                Flow::Continue
            }
            Err(ControllerError::Interrupted) => {
                self.fail(ScannerError::InterruptedWait, self.resume_state);
                Flow::Exit
            }
            Err(e @ ControllerError::Timeout { .. }) => {
                let resume = self.resume_state;
                self.fail(e.into(), resume);
                Flow::Continue
            }
            Err(e) => {
                self.fail(e.into(), SessionState::Idle);
                Flow::Continue
            }
        }
    }

    fn apply_transform(&mut self) {
        if let Some(size) = self.output_size {
            let transform = compute_transform(self.view, size, self.surface.rotation());
            self.surface.set_transform(&transform);
        }
    }

    fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            autofocus: if self.config.continuous_autofocus {
                AutofocusMode::ContinuousPicture
            } else {
                AutofocusMode::Auto
            },
        }
    }

    fn device_event(&mut self, outcome: OpenOutcome) {
        let request = self.capture_request();
        let source = Arc::clone(&self.source);
        let size = self.output_size;
        let make_targets = move || match size {
            Some(size) => vec![StreamTarget::Preview { size }, source.stream_target(size)],
            None => Vec::new(),
        };

        match self.controller.on_device_event(outcome, make_targets, &request) {
            Ok(DeviceTransition::Stale) => {
                tracing::debug!("Ignored device event for a closed open attempt");
            }
            Ok(DeviceTransition::Opened) => {
                self.transition(SessionState::PreviewActive);
                self.emit(ScannerEvent::PreviewStarted);
                if std::mem::take(&mut self.scan_requested) {
                    self.start_scanning();
                }
            }
            Err(e) => self.fail(e.into(), SessionState::Idle),
        }
    }

    fn start_scanning(&mut self) {
        match self.state {
            SessionState::PreviewActive => {
                let epoch = self.gate.open();
                tracing::debug!(epoch, "Gate opened");
                self.transition(SessionState::Scanning);
                self.emit(ScannerEvent::ScanningStarted);
            }
            state if state.is_starting() => {
                tracing::debug!("Scanning will start with the preview");
                self.scan_requested = true;
            }
            state => tracing::debug!(state = %state, "Ignoring start_scanning"),
        }
    }

    fn stop_scanning(&mut self) {
        match self.state {
            SessionState::Scanning => {
                let epoch = self.gate.close();
                tracing::debug!(epoch, "Gate closed");
                self.transition(SessionState::PreviewActive);
                self.emit(ScannerEvent::ScanningStopped);
            }
            state if state.is_starting() => self.scan_requested = false,
            state => tracing::debug!(state = %state, "Ignoring stop_scanning"),
        }
    }

    fn stop_preview(&mut self) -> Flow {
        if !self.state.is_active() {
            return Flow::Continue;
        }
        let had_session = self.state.has_session();
        if self.state == SessionState::Scanning {
            self.stop_scanning();
        }
        self.scan_requested = false;

        if let Err(e) = self.controller.close() {
            tracing::error!(error = %e, "Failed to close camera");
            self.emit(ScannerEvent::Error(e.into()));
            return Flow::Exit;
        }

        self.output_size = None;
        self.transition(SessionState::Stopped);
        if had_session {
            self.emit(ScannerEvent::PreviewStopped);
        }
        Flow::Continue
    }

    fn frame_processed(&mut self, processed: ProcessedFrame) {
        let ProcessedFrame {
            sequence,
            outcome,
            permit,
        } = processed;

        if let DecodeOutcome::Decoded(text) = outcome {
            if self.state == SessionState::Scanning && self.gate.is_current(&permit) {
                PipelineStats::bump(&self.stats.results_delivered);
                self.emit(ScannerEvent::Result(text));
            } else {
                PipelineStats::bump(&self.stats.stale_results_discarded);
                tracing::debug!(sequence, "Discarding result from a stopped scan");
            }
        }

        // The slot reopens only after the outcome has been delivered.
        drop(permit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Facing, MockCameraManager, OpenBehavior, OpenCloseLock};
    use crate::geometry::Rotation;
    use crate::pipeline::{DecodeMiss, Decoder, FrameProcessor};
    use crate::session::HeadlessSurface;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    struct Fixed(Result<String, DecodeMiss>);

    impl Decoder for Fixed {
        fn decode(&mut self, _: &[u8], _: u32, _: u32) -> Result<String, DecodeMiss> {
            self.0.clone()
        }

        fn reset(&mut self) {}
    }

    struct Rig {
        machine: SessionStateMachine,
        control_rx: Receiver<ControlEvent>,
        events: Receiver<ScannerEvent>,
        mock: Arc<MockCameraManager>,
        stats: Arc<PipelineStats>,
        _processor: FrameProcessor,
    }

    impl Rig {
        fn new(mock: MockCameraManager, surface: HeadlessSurface, decoder: Fixed) -> Self {
            Self::with_lock(mock, surface, decoder, Arc::new(OpenCloseLock::new()))
        }

        fn with_lock(
            mock: MockCameraManager,
            surface: HeadlessSurface,
            decoder: Fixed,
            lock: Arc<OpenCloseLock>,
        ) -> Self {
            let mock = Arc::new(mock);
            let config = ScannerConfig {
                lock_timeout_ms: 50,
                ..Default::default()
            };
            let stats = Arc::new(PipelineStats::new());
            let gate = BackpressureGate::new(Arc::clone(&stats));
            let (control_tx, control_rx) = mpsc::channel();
            let (events_tx, events) = mpsc::channel();

            let processed_tx = control_tx.clone();
            let processor = FrameProcessor::spawn(decoder, Arc::clone(&stats), move |p| {
                let _ = processed_tx.send(ControlEvent::FrameProcessed(p));
            })
            .unwrap();
            let source = Arc::new(FrameSource::new(
                gate.clone(),
                processor.sender(),
                Arc::clone(&stats),
            ));
            let controller =
                CaptureDeviceController::with_lock(mock.clone(), lock, config.lock_timeout());
            let machine = SessionStateMachine::new(
                config,
                controller,
                Box::new(surface),
                source,
                gate,
                Arc::clone(&stats),
                control_tx,
                events_tx,
            );

            Self {
                machine,
                control_rx,
                events,
                mock,
                stats,
                _processor: processor,
            }
        }

        /// Feeds the next queued internal event (device answer or decode
        /// outcome) to the machine.
        fn pump(&mut self) -> Flow {
            let event = self
                .control_rx
                .recv_timeout(Duration::from_secs(1))
                .expect("expected a queued control event");
            self.machine.handle(event)
        }

        fn next_event(&self) -> ScannerEvent {
            self.events
                .recv_timeout(Duration::from_secs(1))
                .expect("expected a scanner event")
        }

        fn no_event(&self) -> bool {
            self.events.try_recv().is_err()
        }
    }

    fn back_camera() -> MockCameraManager {
        MockCameraManager::new().with_camera(
            "0",
            Facing::Back,
            vec![
                OutputSize::new(1920, 1080),
                OutputSize::new(960, 540),
                OutputSize::new(640, 480),
            ],
        )
    }

    fn landscape() -> HeadlessSurface {
        HeadlessSurface::new(ViewSize::new(1280, 720), Rotation::Deg0)
    }

    fn started(decoder: Fixed) -> Rig {
        let mut rig = Rig::new(back_camera(), landscape(), decoder);
        rig.machine.handle(ControlEvent::StartPreview);
        rig.pump();
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStarted);
        rig
    }

    #[test]
    fn test_preview_starts_with_selected_size() {
        let surface = landscape();
        let record = surface.record();
        let mut rig = Rig::new(back_camera(), surface, Fixed(Err(DecodeMiss::NotFound)));

        rig.machine.handle(ControlEvent::StartPreview);
        assert_eq!(rig.machine.state(), SessionState::Opening);
        rig.pump();

        assert_eq!(rig.machine.state(), SessionState::PreviewActive);
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStarted);
        assert_eq!(rig.machine.output_size(), Some(OutputSize::new(960, 540)));
        assert_eq!(record.lock().unwrap().aspect_ratio, Some((960, 540)));
        assert!(rig.mock.is_streaming());
        assert_eq!(
            rig.mock.last_request().unwrap().autofocus,
            AutofocusMode::ContinuousPicture
        );
    }

    #[test]
    fn test_pending_until_surface_ready() {
        let surface = HeadlessSurface::unavailable(ViewSize::new(720, 1280), Rotation::Deg90);
        let record = surface.record();
        let mut rig = Rig::new(back_camera(), surface, Fixed(Err(DecodeMiss::NotFound)));

        rig.machine.handle(ControlEvent::StartPreview);
        assert_eq!(rig.machine.state(), SessionState::PreviewPending);
        assert_eq!(rig.mock.stats().open_requests, 0);

        rig.machine
            .handle(ControlEvent::SurfaceAvailable(ViewSize::new(720, 1280)));
        assert_eq!(rig.machine.state(), SessionState::Opening);
        rig.pump();
        assert_eq!(rig.machine.state(), SessionState::PreviewActive);

        let record = record.lock().unwrap();
        // Portrait viewport: aspect ratio is published rotated.
        assert_eq!(record.aspect_ratio, Some((540, 960)));
        assert!(record.transform.is_some());
    }

    #[test]
    fn test_restart_after_surface_event_reopens() {
        let surface = HeadlessSurface::unavailable(ViewSize::new(1280, 720), Rotation::Deg0);
        let record = surface.record();
        let mut rig = Rig::new(back_camera(), surface, Fixed(Err(DecodeMiss::NotFound)));

        rig.machine.handle(ControlEvent::StartPreview);
        rig.machine
            .handle(ControlEvent::SurfaceAvailable(ViewSize::new(720, 1280)));
        rig.pump();
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStarted);

        rig.machine.handle(ControlEvent::StopPreview);
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStopped);
        record.lock().unwrap().aspect_ratio = None;

        rig.machine.handle(ControlEvent::StartPreview);
        assert_eq!(rig.machine.state(), SessionState::Opening);
        rig.pump();
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStarted);
        assert_eq!(rig.mock.stats().open_requests, 2);
        // The viewport reported by the surface event is kept.
        assert_eq!(record.lock().unwrap().aspect_ratio, Some((540, 960)));
    }

    #[test]
    fn test_discarded_device_event_closes_device() {
        let mock = back_camera().with_open_behavior(OpenBehavior::Hold);
        let mut rig = Rig::new(mock, landscape(), Fixed(Err(DecodeMiss::NotFound)));
        rig.machine.handle(ControlEvent::StartPreview);
        assert!(rig.mock.complete_pending_open());

        let event = rig.control_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        event.discard();
        assert_eq!(rig.mock.stats().devices_closed, 1);
    }

    #[test]
    fn test_scanning_delivers_results() {
        let mut rig = started(Fixed(Ok("hello".into())));

        rig.machine.handle(ControlEvent::StartScanning);
        assert_eq!(rig.next_event(), ScannerEvent::ScanningStarted);

        assert!(rig.mock.emit_frame(vec![0u8; 16], 4, 4));
        rig.pump();
        assert_eq!(rig.next_event(), ScannerEvent::Result("hello".into()));
        assert_eq!(rig.stats.snapshot().results_delivered, 1);

        // Gate reopened after delivery.
        assert!(rig.mock.emit_frame(vec![0u8; 16], 4, 4));
        rig.pump();
        assert_eq!(rig.next_event(), ScannerEvent::Result("hello".into()));
    }

    #[test]
    fn test_preview_only_drops_frames() {
        let rig = started(Fixed(Ok("hello".into())));

        rig.mock.emit_frame(vec![0u8; 16], 4, 4);
        rig.mock.emit_frame(vec![0u8; 16], 4, 4);

        let counters = rig.stats.snapshot();
        assert_eq!(counters.frames_dropped_idle, 2);
        assert_eq!(rig.mock.stats().frames_released, 2);
        assert!(rig.no_event());
    }

    #[test]
    fn test_stop_scanning_discards_in_flight_result() {
        let mut rig = started(Fixed(Ok("late".into())));
        rig.machine.handle(ControlEvent::StartScanning);
        assert_eq!(rig.next_event(), ScannerEvent::ScanningStarted);

        rig.mock.emit_frame(vec![0u8; 16], 4, 4);
        // The outcome is queued but not yet applied when scanning stops.
        rig.machine.handle(ControlEvent::StopScanning);
        assert_eq!(rig.next_event(), ScannerEvent::ScanningStopped);
        rig.pump();

        assert!(rig.no_event());
        assert_eq!(rig.stats.snapshot().stale_results_discarded, 1);
    }

    #[test]
    fn test_stop_preview_discards_in_flight_result() {
        let mut rig = started(Fixed(Ok("late".into())));
        rig.machine.handle(ControlEvent::StartScanning);
        assert_eq!(rig.next_event(), ScannerEvent::ScanningStarted);

        assert!(rig.mock.emit_frame(vec![0u8; 16], 4, 4));
        rig.machine.handle(ControlEvent::StopPreview);
        assert_eq!(rig.next_event(), ScannerEvent::ScanningStopped);
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStopped);
        rig.pump();

        assert!(rig.no_event());
        assert_eq!(rig.machine.state(), SessionState::Stopped);
        assert_eq!(rig.stats.snapshot().stale_results_discarded, 1);
        assert_eq!(rig.mock.stats().frames_released, 1);
        assert_eq!(rig.mock.stats().devices_closed, 1);
    }

    #[test]
    fn test_restarted_scan_discards_previous_result() {
        let mut rig = started(Fixed(Ok("old".into())));
        rig.machine.handle(ControlEvent::StartScanning);
        rig.next_event();

        rig.mock.emit_frame(vec![0u8; 16], 4, 4);
        rig.machine.handle(ControlEvent::StopScanning);
        rig.machine.handle(ControlEvent::StartScanning);
        rig.next_event();
        rig.next_event();
        rig.pump();

        assert!(rig.no_event());
        assert_eq!(rig.machine.state(), SessionState::Scanning);
    }

    #[test]
    fn test_scan_requested_while_opening() {
        let mut rig = Rig::new(back_camera(), landscape(), Fixed(Err(DecodeMiss::NotFound)));
        rig.machine.handle(ControlEvent::StartPreview);
        rig.machine.handle(ControlEvent::StartScanning);
        assert_eq!(rig.machine.state(), SessionState::Opening);

        rig.pump();
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStarted);
        assert_eq!(rig.next_event(), ScannerEvent::ScanningStarted);
        assert_eq!(rig.machine.state(), SessionState::Scanning);
    }

    #[test]
    fn test_stop_preview_closes_device() {
        let mut rig = started(Fixed(Err(DecodeMiss::NotFound)));
        rig.machine.handle(ControlEvent::StartScanning);
        rig.next_event();

        rig.machine.handle(ControlEvent::StopPreview);
        assert_eq!(rig.next_event(), ScannerEvent::ScanningStopped);
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStopped);
        assert_eq!(rig.machine.state(), SessionState::Stopped);
        assert_eq!(rig.machine.output_size(), None);

        let stats = rig.mock.stats();
        assert_eq!(stats.sessions_closed, 1);
        assert_eq!(stats.devices_closed, 1);
        assert!(!rig.mock.emit_frame(vec![0u8; 16], 4, 4));

        // Restart from Stopped.
        rig.machine.handle(ControlEvent::StartPreview);
        rig.pump();
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStarted);
    }

    #[test]
    fn test_open_timeout_leaves_state() {
        let lock = Arc::new(OpenCloseLock::new());
        lock.acquire().unwrap();
        let mut rig = Rig::with_lock(
            back_camera(),
            landscape(),
            Fixed(Err(DecodeMiss::NotFound)),
            Arc::clone(&lock),
        );

        rig.machine.handle(ControlEvent::StartPreview);
        assert_eq!(
            rig.next_event(),
            ScannerEvent::Error(ScannerError::TimeoutOpeningDevice)
        );
        assert_eq!(rig.machine.state(), SessionState::Idle);
        assert_eq!(rig.machine.output_size(), None);
        assert_eq!(rig.mock.stats().open_requests, 0);
        assert_eq!(rig.mock.stats().sessions_created, 0);

        // Retrying once the lock is free succeeds.
        lock.release();
        rig.machine.handle(ControlEvent::StartPreview);
        rig.pump();
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStarted);
    }

    #[test]
    fn test_second_start_while_opening_is_ignored() {
        let mock = back_camera().with_open_behavior(OpenBehavior::Hold);
        let mut rig = Rig::new(mock, landscape(), Fixed(Err(DecodeMiss::NotFound)));
        rig.machine.handle(ControlEvent::StartPreview);
        rig.machine.handle(ControlEvent::StartPreview);

        assert_eq!(rig.machine.state(), SessionState::Opening);
        assert_eq!(rig.mock.stats().open_requests, 1);
        assert!(rig.no_event());

        assert!(rig.mock.complete_pending_open());
        rig.pump();
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStarted);
    }

    #[test]
    fn test_access_failure_returns_to_idle() {
        let mock = back_camera().with_open_behavior(OpenBehavior::Fail);
        let mut rig = Rig::new(mock, landscape(), Fixed(Err(DecodeMiss::NotFound)));
        rig.machine.handle(ControlEvent::StartPreview);
        rig.pump();

        assert!(matches!(
            rig.next_event(),
            ScannerEvent::Error(ScannerError::HardwareAccessFailure(_))
        ));
        assert_eq!(rig.machine.state(), SessionState::Idle);
    }

    #[test]
    fn test_configure_failure_reported() {
        let mock = back_camera().with_session_failure();
        let mut rig = Rig::new(mock, landscape(), Fixed(Err(DecodeMiss::NotFound)));
        rig.machine.handle(ControlEvent::StartPreview);
        rig.pump();

        assert!(matches!(
            rig.next_event(),
            ScannerEvent::Error(ScannerError::SessionConfigureFailed(_))
        ));
        assert_eq!(rig.machine.state(), SessionState::Idle);
        assert_eq!(rig.mock.stats().devices_closed, 1);
    }

    #[test]
    fn test_no_back_camera() {
        let mock =
            MockCameraManager::new().with_camera("1", Facing::Front, vec![OutputSize::new(640, 480)]);
        let mut rig = Rig::new(mock, landscape(), Fixed(Err(DecodeMiss::NotFound)));
        rig.machine.handle(ControlEvent::StartPreview);

        assert!(matches!(
            rig.next_event(),
            ScannerEvent::Error(ScannerError::HardwareAccessFailure(_))
        ));
        assert_eq!(rig.machine.state(), SessionState::Idle);
    }

    #[test]
    fn test_resize_recomputes_transform() {
        let surface = HeadlessSurface::new(ViewSize::new(1280, 720), Rotation::Deg90);
        let record = surface.record();
        let mut rig = Rig::new(back_camera(), surface, Fixed(Err(DecodeMiss::NotFound)));
        rig.machine.handle(ControlEvent::StartPreview);
        rig.pump();

        rig.machine
            .handle(ControlEvent::SurfaceResized(ViewSize::new(1920, 1080)));
        let record = record.lock().unwrap();
        assert_eq!(record.transforms_applied, 2);
        let expected = f32::max(1080.0 / 540.0, 1920.0 / 960.0);
        assert!((record.transform.unwrap().scale - expected).abs() < 1e-4);
        // Output size is not recomputed mid-session.
        assert_eq!(rig.machine.output_size(), Some(OutputSize::new(960, 540)));
    }

    #[test]
    fn test_shutdown_exits() {
        let mut rig = started(Fixed(Err(DecodeMiss::NotFound)));
        assert_eq!(rig.machine.handle(ControlEvent::Shutdown), Flow::Exit);
        assert_eq!(rig.next_event(), ScannerEvent::PreviewStopped);
        assert_eq!(rig.mock.stats().devices_closed, 1);
    }
}
