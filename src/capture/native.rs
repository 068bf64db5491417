//! Local webcam backend built on nokhwa.
//!
//! nokhwa camera handles are not guaranteed to be `Send`, so each handle
//! lives on the thread that created it: open checks access on a helper
//! thread, and the repeating request runs a dedicated streaming thread that
//! pushes luma frames into the frame listener. The request only succeeds
//! once that thread has the stream running.

use super::camera::{
    CameraDevice, CameraError, CameraId, CameraIdentity, CameraManager, CaptureRequest,
    CaptureSession, DeviceCallback, DeviceEvent, Facing, FrameListener, StreamTarget,
};
use super::Frame;
use crate::geometry::OutputSize;
use nokhwa::pixel_format::LumaFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const STREAM_FPS: u32 = 30;
/// Consecutive capture failures after which the stream gives up.
const MAX_CAPTURE_FAILURES: u32 = 10;
const CAPTURE_RETRY_BASE: Duration = Duration::from_millis(10);

fn parse_index(id: &CameraId) -> CameraIndex {
    match id.as_str().parse::<u32>() {
        Ok(index) => CameraIndex::Index(index),
        Err(_) => CameraIndex::String(id.as_str().to_string()),
    }
}

fn access_failed(e: nokhwa::NokhwaError) -> CameraError {
    CameraError::AccessFailed(e.to_string())
}

/// Camera manager for locally attached cameras.
#[derive(Debug, Clone, Copy)]
pub struct NativeCameraManager {
    backend: ApiBackend,
}

impl Default for NativeCameraManager {
    fn default() -> Self {
        Self {
            backend: ApiBackend::Auto,
        }
    }
}

impl NativeCameraManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CameraManager for NativeCameraManager {
    fn camera_ids(&self) -> Result<Vec<CameraId>, CameraError> {
        let cameras = nokhwa::query(self.backend).map_err(access_failed)?;
        Ok(cameras
            .iter()
            .map(|info| CameraId::new(info.index().as_string()))
            .collect())
    }

    fn identity(&self, id: &CameraId) -> Result<CameraIdentity, CameraError> {
        let requested = RequestedFormat::new::<LumaFormat>(RequestedFormatType::None);
        let mut camera = Camera::new(parse_index(id), requested).map_err(access_failed)?;

        let mut output_sizes: Vec<OutputSize> = Vec::new();
        for format in camera.compatible_camera_formats().map_err(access_failed)? {
            let size = OutputSize::new(format.resolution().width(), format.resolution().height());
            if !output_sizes.contains(&size) {
                output_sizes.push(size);
            }
        }

        // Webcams do not report a lens facing.
        Ok(CameraIdentity {
            id: id.clone(),
            facing: Facing::External,
            output_sizes,
        })
    }

    fn open(&self, id: &CameraId, on_event: DeviceCallback) -> Result<(), CameraError> {
        let id = id.clone();
        std::thread::Builder::new()
            .name("camera-open".into())
            .spawn(move || {
                let requested = RequestedFormat::new::<LumaFormat>(RequestedFormatType::None);
                match Camera::new(parse_index(&id), requested) {
                    Ok(camera) => {
                        drop(camera);
                        on_event(DeviceEvent::Opened(Box::new(NativeDevice { id })));
                    }
                    Err(e) => on_event(DeviceEvent::Error(access_failed(e))),
                }
            })
            .map_err(|e| CameraError::AccessFailed(e.to_string()))?;
        Ok(())
    }
}

struct NativeDevice {
    id: CameraId,
}

impl CameraDevice for NativeDevice {
    fn id(&self) -> &CameraId {
        &self.id
    }

    fn create_session(
        &mut self,
        targets: &[StreamTarget],
    ) -> Result<Box<dyn CaptureSession>, CameraError> {
        let (size, listener) = targets
            .iter()
            .find_map(|target| match target {
                StreamTarget::Frames { size, listener } => Some((*size, Arc::clone(listener))),
                StreamTarget::Preview { .. } => None,
            })
            .ok_or_else(|| CameraError::ConfigureFailed("no frame stream target".into()))?;

        Ok(Box::new(NativeSession {
            id: self.id.clone(),
            size,
            listener,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }

    fn close(&mut self) {}
}

struct NativeSession {
    id: CameraId,
    size: OutputSize,
    listener: Arc<dyn FrameListener>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureSession for NativeSession {
    fn set_repeating_request(&mut self, _request: &CaptureRequest) -> Result<(), CameraError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let index = parse_index(&self.id);
        let format = CameraFormat::new(
            Resolution::new(self.size.width, self.size.height),
            FrameFormat::MJPEG,
            STREAM_FPS,
        );
        let listener = Arc::clone(&self.listener);
        let stop = Arc::clone(&self.stop);
        let (ready_tx, ready_rx) = mpsc::channel();

        // The camera is created on the stream thread; wait for it to report
        // whether the stream actually started.
        let worker = thread::Builder::new()
            .name("camera-stream".into())
            .spawn(move || stream_frames(index, format, listener, stop, ready_tx))
            .map_err(|e| CameraError::ConfigureFailed(e.to_string()))?;

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err(CameraError::ConfigureFailed("camera stream thread exited".into()))
        });
        match started {
            Ok(()) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                if worker.join().is_err() {
                    tracing::warn!(camera = %self.id, "Camera stream thread panicked");
                }
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!(camera = %self.id, "Camera stream thread panicked");
            }
        }
    }
}

fn stream_frames(
    index: CameraIndex,
    format: CameraFormat,
    listener: Arc<dyn FrameListener>,
    stop: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<(), CameraError>>,
) {
    let requested = RequestedFormat::new::<LumaFormat>(RequestedFormatType::Closest(format));
    let opened = Camera::new(index, requested).and_then(|mut camera| {
        camera.open_stream()?;
        Ok(camera)
    });
    let mut camera = match opened {
        Ok(camera) => {
            let _ = ready.send(Ok(()));
            camera
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to start camera stream");
            let _ = ready.send(Err(CameraError::ConfigureFailed(e.to_string())));
            return;
        }
    };

    let mut sequence = 0u64;
    let mut failures = 0u32;
    while !stop.load(Ordering::SeqCst) {
        let buffer = match camera.frame() {
            Ok(buffer) => {
                failures = 0;
                buffer
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_CAPTURE_FAILURES {
                    tracing::error!(error = %e, failures, "Camera stream failing, giving up");
                    break;
                }
                tracing::warn!(error = %e, failures, "Frame capture failed");
                thread::sleep(CAPTURE_RETRY_BASE * failures);
                continue;
            }
        };
        match buffer.decode_image::<LumaFormat>() {
            Ok(image) => {
                sequence += 1;
                let (width, height) = (image.width(), image.height());
                listener.on_frame(Frame::new(image.into_raw(), width, height, sequence));
            }
            Err(e) => tracing::warn!(error = %e, "Frame decode failed"),
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!(error = %e, "Failed to stop camera stream");
    }
}
