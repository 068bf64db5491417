//! Public scanner handle.
//!
//! [`BarcodeScanner`] owns the two threads the scanner runs on: the control
//! thread, which applies every [`ControlEvent`] in arrival order, and the
//! decode worker. Calls on the handle only enqueue events, so they return
//! immediately and may be made from any thread.

use super::events::ScannerEvent;
use super::machine::{ControlEvent, Flow, SessionStateMachine};
use super::state::SessionState;
use super::surface::PreviewSurface;
use crate::capture::{CameraManager, CaptureDeviceController, ConfigError, ScannerConfig};
use crate::geometry::ViewSize;
use crate::pipeline::{
    BackpressureGate, Decoder, FrameProcessor, FrameSource, PipelineCounters, PipelineStats,
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Errors starting the scanner.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn scanner thread: {0}")]
    Io(#[from] std::io::Error),
}

/// Camera preview with on-demand barcode decoding.
pub struct BarcodeScanner {
    control_tx: Sender<ControlEvent>,
    control: Option<JoinHandle<()>>,
    processor: FrameProcessor,
    stats: Arc<PipelineStats>,
    state: Arc<Mutex<SessionState>>,
}

impl BarcodeScanner {
    /// Starts the scanner threads. Notifications arrive on the returned
    /// receiver in the order they were produced.
    pub fn spawn<D>(
        config: ScannerConfig,
        manager: Arc<dyn CameraManager>,
        surface: Box<dyn PreviewSurface>,
        decoder: D,
    ) -> Result<(Self, Receiver<ScannerEvent>), StartError>
    where
        D: Decoder + 'static,
    {
        config.validate()?;

        let stats = Arc::new(PipelineStats::new());
        let gate = BackpressureGate::new(Arc::clone(&stats));
        let (control_tx, control_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();

        let processed_tx = control_tx.clone();
        let processor = FrameProcessor::spawn(decoder, Arc::clone(&stats), move |processed| {
            // Control thread gone: the permit drops here and the frame is settled.
            let _ = processed_tx.send(ControlEvent::FrameProcessed(processed));
        })?;

        let source = Arc::new(FrameSource::new(
            gate.clone(),
            processor.sender(),
            Arc::clone(&stats),
        ));
        let controller = CaptureDeviceController::new(manager, config.lock_timeout());
        let mut machine = SessionStateMachine::new(
            config,
            controller,
            surface,
            source,
            gate,
            Arc::clone(&stats),
            control_tx.clone(),
            events_tx,
        );
        let state = machine.published_state();

        let control = thread::Builder::new()
            .name("scanner-control".into())
            .spawn(move || {
                tracing::debug!("Scanner control loop started");
                for event in control_rx.iter() {
                    if machine.handle(event) == Flow::Exit {
                        break;
                    }
                }
                // Answers to opens that settled during shutdown.
                control_rx.try_iter().for_each(ControlEvent::discard);
                tracing::debug!(state = %machine.state(), "Scanner control loop stopped");
            })?;

        tracing::info!("Scanner started");
        Ok((
            Self {
                control_tx,
                control: Some(control),
                processor,
                stats,
                state,
            },
            events_rx,
        ))
    }

    fn send(&self, event: ControlEvent) {
        if self.control_tx.send(event).is_err() {
            tracing::warn!("Scanner control loop is not running");
        }
    }

    /// Opens the camera and starts the preview.
    pub fn start_preview(&self) {
        self.send(ControlEvent::StartPreview);
    }

    /// Stops scanning and the preview and closes the camera.
    pub fn stop_preview(&self) {
        self.send(ControlEvent::StopPreview);
    }

    /// Starts decoding frames.
    pub fn start_scanning(&self) {
        self.send(ControlEvent::StartScanning);
    }

    /// Stops decoding frames. A decode in flight finishes but its result
    /// is not delivered.
    pub fn stop_scanning(&self) {
        self.send(ControlEvent::StopScanning);
    }

    /// Reports that the rendering surface is ready.
    pub fn surface_available(&self, view: ViewSize) {
        self.send(ControlEvent::SurfaceAvailable(view));
    }

    /// Reports a new rendering surface size.
    pub fn surface_resized(&self, view: ViewSize) {
        self.send(ControlEvent::SurfaceResized(view));
    }

    /// State as of the last event the control thread applied.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn counters(&self) -> PipelineCounters {
        self.stats.snapshot()
    }

    /// Stops the preview and both threads. Called on drop.
    pub fn shutdown(&mut self) {
        let Some(control) = self.control.take() else {
            return;
        };
        self.send(ControlEvent::Shutdown);
        if control.join().is_err() {
            tracing::error!("Scanner control thread panicked");
        }
        self.processor.shutdown();
        tracing::info!("Scanner stopped");
    }
}

impl Drop for BarcodeScanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
