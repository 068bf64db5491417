//! In-memory camera for tests and the demo binary.
//!
//! Frames are pushed by the caller with [`MockCameraManager::emit_frame`],
//! which plays the role of the driver thread.

use super::camera::{
    CameraDevice, CameraError, CameraId, CameraIdentity, CameraManager, CaptureRequest,
    CaptureSession, DeviceCallback, DeviceEvent, Facing, FrameListener, StreamTarget,
};
use super::Frame;
use crate::geometry::OutputSize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How the mock answers open requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenBehavior {
    /// Reports `Opened` from a spawned thread.
    #[default]
    Succeed,
    /// Keeps the request pending until [`MockCameraManager::complete_pending_open`].
    Hold,
    /// Reports an access error.
    Fail,
    /// Reports a disconnect.
    Disconnect,
    /// Drops the callback without ever answering.
    Abandon,
}

/// Counters describing what the mock was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    pub open_requests: u64,
    pub devices_closed: u64,
    pub sessions_created: u64,
    pub sessions_closed: u64,
    pub repeating_requests: u64,
    pub frames_emitted: u64,
    pub frames_released: u64,
}

#[derive(Default)]
struct Shared {
    stats: Mutex<MockStats>,
    pending: Mutex<Option<(CameraId, DeviceCallback)>>,
    listener: Mutex<Option<Arc<dyn FrameListener>>>,
    last_request: Mutex<Option<CaptureRequest>>,
    sequence: AtomicU64,
}

impl Shared {
    fn stats(&self) -> MutexGuard<'_, MockStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listener(&self) -> MutexGuard<'_, Option<Arc<dyn FrameListener>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mock camera manager that serves synthetic devices.
#[derive(Default)]
pub struct MockCameraManager {
    cameras: Vec<CameraIdentity>,
    open_behavior: OpenBehavior,
    fail_session: bool,
    shared: Arc<Shared>,
}

impl MockCameraManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a camera to the enumeration list.
    pub fn with_camera(mut self, id: &str, facing: Facing, output_sizes: Vec<OutputSize>) -> Self {
        self.cameras.push(CameraIdentity {
            id: CameraId::new(id),
            facing,
            output_sizes,
        });
        self
    }

    pub fn with_open_behavior(mut self, behavior: OpenBehavior) -> Self {
        self.open_behavior = behavior;
        self
    }

    /// Makes every session creation fail.
    pub fn with_session_failure(mut self) -> Self {
        self.fail_session = true;
        self
    }

    pub fn stats(&self) -> MockStats {
        self.shared.stats().clone()
    }

    /// Returns the last repeating request started on a session.
    pub fn last_request(&self) -> Option<CaptureRequest> {
        *self
            .shared
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true while a session with a frame stream is live.
    pub fn is_streaming(&self) -> bool {
        self.shared.listener().is_some()
    }

    /// Answers a held open request with `Opened`. Returns false if none was
    /// pending.
    pub fn complete_pending_open(&self) -> bool {
        let pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match pending {
            Some((id, callback)) => {
                callback(DeviceEvent::Opened(Box::new(self.device(id))));
                true
            }
            None => false,
        }
    }

    /// Pushes a frame into the live stream, as the driver would.
    ///
    /// Returns false if no stream is attached; the frame is released
    /// immediately in that case.
    pub fn emit_frame(&self, luma: Vec<u8>, width: u32, height: u32) -> bool {
        let sequence = self.shared.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::clone(&self.shared);
        let frame = Frame::new(luma, width, height, sequence).with_release(move || {
            shared.stats().frames_released += 1;
        });
        self.shared.stats().frames_emitted += 1;

        // Clone out so the listener runs without the mock's lock held.
        let listener = self.shared.listener().clone();
        match listener {
            Some(listener) => {
                listener.on_frame(frame);
                true
            }
            None => false,
        }
    }

    fn device(&self, id: CameraId) -> MockDevice {
        MockDevice {
            id,
            fail_session: self.fail_session,
            shared: Arc::clone(&self.shared),
            closed: false,
        }
    }
}

impl CameraManager for MockCameraManager {
    fn camera_ids(&self) -> Result<Vec<CameraId>, CameraError> {
        Ok(self.cameras.iter().map(|c| c.id.clone()).collect())
    }

    fn identity(&self, id: &CameraId) -> Result<CameraIdentity, CameraError> {
        self.cameras
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .ok_or_else(|| CameraError::DeviceNotFound(id.to_string()))
    }

    fn open(&self, id: &CameraId, on_event: DeviceCallback) -> Result<(), CameraError> {
        self.identity(id)?;
        self.shared.stats().open_requests += 1;

        match self.open_behavior {
            OpenBehavior::Hold => {
                *self
                    .shared
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some((id.clone(), on_event));
            }
            OpenBehavior::Succeed => {
                let device = self.device(id.clone());
                std::thread::spawn(move || on_event(DeviceEvent::Opened(Box::new(device))));
            }
            OpenBehavior::Fail => {
                let error = CameraError::AccessFailed(format!("camera {} is in use", id));
                std::thread::spawn(move || on_event(DeviceEvent::Error(error)));
            }
            OpenBehavior::Disconnect => {
                std::thread::spawn(move || on_event(DeviceEvent::Disconnected));
            }
            OpenBehavior::Abandon => {
                std::thread::spawn(move || drop(on_event));
            }
        }
        Ok(())
    }
}

struct MockDevice {
    id: CameraId,
    fail_session: bool,
    shared: Arc<Shared>,
    closed: bool,
}

impl CameraDevice for MockDevice {
    fn id(&self) -> &CameraId {
        &self.id
    }

    fn create_session(
        &mut self,
        targets: &[StreamTarget],
    ) -> Result<Box<dyn CaptureSession>, CameraError> {
        if self.fail_session {
            return Err(CameraError::ConfigureFailed("mock session rejected".into()));
        }

        let listener = targets.iter().find_map(|target| match target {
            StreamTarget::Frames { listener, .. } => Some(Arc::clone(listener)),
            StreamTarget::Preview { .. } => None,
        });
        *self.shared.listener() = listener;
        self.shared.stats().sessions_created += 1;

        Ok(Box::new(MockSession {
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.stats().devices_closed += 1;
        }
    }
}

struct MockSession {
    shared: Arc<Shared>,
    closed: bool,
}

impl CaptureSession for MockSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), CameraError> {
        *self
            .shared
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(*request);
        self.shared.stats().repeating_requests += 1;
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            *self.shared.listener() = None;
            self.shared.stats().sessions_closed += 1;
        }
    }
}
