//! Device ownership and the open/close lifecycle.
//!
//! The controller is the only owner of the opened device, its capture
//! session and the stream targets. Opening and closing are serialized by
//! [`OpenCloseLock`]: `open` takes it with a bounded wait and the device's
//! terminal event gives it back; `close` waits for it unconditionally, so a
//! close issued while an open is outstanding runs once the open settles.
//! The outcome is handed on before the lock is released, so whoever closes
//! next can already see it.

use super::camera::{
    CameraDevice, CameraError, CameraIdentity, CameraManager, CaptureRequest, CaptureSession,
    DeviceEvent, StreamTarget,
};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from the device controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("timed out after {waited:?} waiting to lock camera opening")]
    Timeout { waited: Duration },
    #[error("interrupted while waiting for the camera lock")]
    Interrupted,
    #[error("camera is already open")]
    AlreadyOpen,
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Binary lock that can be released from a different thread than the one
/// that acquired it.
#[derive(Debug, Default)]
pub struct OpenCloseLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl OpenCloseLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the lock. Returns `Ok(false)` on timeout.
    pub fn try_acquire_for(&self, timeout: Duration) -> Result<bool, ControllerError> {
        let held = self.held.lock().map_err(|_| ControllerError::Interrupted)?;
        let (mut held, result) = self
            .released
            .wait_timeout_while(held, timeout, |held| *held)
            .map_err(|_| ControllerError::Interrupted)?;

        if result.timed_out() && *held {
            return Ok(false);
        }
        *held = true;
        Ok(true)
    }

    /// Waits for the lock without a bound.
    pub fn acquire(&self) -> Result<(), ControllerError> {
        let held = self.held.lock().map_err(|_| ControllerError::Interrupted)?;
        let mut held = self
            .released
            .wait_while(held, |held| *held)
            .map_err(|_| ControllerError::Interrupted)?;
        *held = true;
        Ok(())
    }

    pub fn release(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = false;
        self.released.notify_one();
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lifecycle of the controlled device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Opening,
    Open,
}

/// Terminal device event tagged with the open attempt it belongs to.
#[derive(Debug)]
pub struct OpenOutcome {
    pub attempt: u64,
    pub event: DeviceEvent,
}

/// What a device event did to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTransition {
    /// The session is configured and repeating.
    Opened,
    /// The event belonged to an attempt that was closed or superseded.
    Stale,
}

/// The open request as held by the camera manager.
///
/// Completing it hands the outcome on and then releases the lock. If the
/// manager drops it without answering, the attempt ends with an access
/// error instead of leaving the lock held.
struct PendingOpen<F: FnOnce(OpenOutcome)> {
    attempt: u64,
    lock: Arc<OpenCloseLock>,
    notify: Option<F>,
}

impl<F: FnOnce(OpenOutcome)> PendingOpen<F> {
    fn complete(&mut self, event: DeviceEvent) {
        if let Some(notify) = self.notify.take() {
            notify(OpenOutcome {
                attempt: self.attempt,
                event,
            });
            self.lock.release();
        }
    }
}

impl<F: FnOnce(OpenOutcome)> Drop for PendingOpen<F> {
    fn drop(&mut self) {
        if self.notify.is_some() {
            tracing::warn!(attempt = self.attempt, "Open request dropped without an answer");
            self.complete(DeviceEvent::Error(CameraError::AccessFailed(
                "open request abandoned by the camera manager".into(),
            )));
        }
    }
}

/// The live device and capture session pairing.
pub struct SessionHandle {
    device: Box<dyn CameraDevice>,
    session: Box<dyn CaptureSession>,
}

impl SessionHandle {
    pub fn camera_id(&self) -> &super::CameraId {
        self.device.id()
    }
}

/// Owns the camera device and serializes open/close.
pub struct CaptureDeviceController {
    manager: Arc<dyn CameraManager>,
    lock: Arc<OpenCloseLock>,
    lock_timeout: Duration,
    state: DeviceState,
    attempt: u64,
    handle: Option<SessionHandle>,
    targets: Vec<StreamTarget>,
}

impl CaptureDeviceController {
    pub fn new(manager: Arc<dyn CameraManager>, lock_timeout: Duration) -> Self {
        Self::with_lock(manager, Arc::new(OpenCloseLock::new()), lock_timeout)
    }

    /// Like [`new`](Self::new), but coordinates through a lock shared with
    /// other users of the same camera.
    pub fn with_lock(
        manager: Arc<dyn CameraManager>,
        lock: Arc<OpenCloseLock>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            lock,
            lock_timeout,
            state: DeviceState::Closed,
            attempt: 0,
            handle: None,
            targets: Vec::new(),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    pub fn manager(&self) -> &dyn CameraManager {
        self.manager.as_ref()
    }

    /// Requests access to `identity`'s camera.
    ///
    /// Fails with [`ControllerError::Timeout`] if the lock is not acquired in
    /// time, leaving the controller untouched. On success the controller is
    /// `Opening` and `notify` later receives the terminal device event. The
    /// lock is released right after `notify` returns.
    pub fn open(
        &mut self,
        identity: &CameraIdentity,
        notify: impl FnOnce(OpenOutcome) + Send + 'static,
    ) -> Result<(), ControllerError> {
        let started = Instant::now();
        if !self.lock.try_acquire_for(self.lock_timeout)? {
            tracing::warn!(camera = %identity.id, "Timed out waiting to lock camera opening");
            return Err(ControllerError::Timeout {
                waited: started.elapsed(),
            });
        }
        if self.state != DeviceState::Closed {
            self.lock.release();
            return Err(ControllerError::AlreadyOpen);
        }

        self.attempt += 1;
        let attempt = self.attempt;
        let mut pending = PendingOpen {
            attempt,
            lock: Arc::clone(&self.lock),
            notify: Some(notify),
        };
        let callback = Box::new(move |event: DeviceEvent| pending.complete(event));

        self.state = DeviceState::Opening;
        tracing::info!(camera = %identity.id, attempt, "Opening camera");

        if let Err(e) = self.manager.open(&identity.id, callback) {
            self.state = DeviceState::Closed;
            self.lock.release();
            tracing::error!(camera = %identity.id, error = %e, "Camera open rejected");
            return Err(e.into());
        }
        Ok(())
    }

    /// Applies a terminal device event.
    ///
    /// On `Opened`, builds the stream targets with `make_targets`, creates
    /// the capture session over them and starts `request` repeating. A
    /// failure there closes the device again.
    pub fn on_device_event(
        &mut self,
        outcome: OpenOutcome,
        make_targets: impl FnOnce() -> Vec<StreamTarget>,
        request: &CaptureRequest,
    ) -> Result<DeviceTransition, ControllerError> {
        if outcome.attempt != self.attempt || self.state != DeviceState::Opening {
            if let DeviceEvent::Opened(mut device) = outcome.event {
                tracing::debug!(camera = %device.id(), attempt = outcome.attempt, "Closing late device");
                device.close();
            }
            return Ok(DeviceTransition::Stale);
        }

        match outcome.event {
            DeviceEvent::Opened(mut device) => {
                let targets = make_targets();
                let session = device
                    .create_session(&targets)
                    .and_then(|mut session| match session.set_repeating_request(request) {
                        Ok(()) => Ok(session),
                        Err(e) => {
                            session.close();
                            Err(e)
                        }
                    });

                match session {
                    Ok(session) => {
                        tracing::info!(camera = %device.id(), "Camera session configured");
                        self.handle = Some(SessionHandle { device, session });
                        self.targets = targets;
                        self.state = DeviceState::Open;
                        Ok(DeviceTransition::Opened)
                    }
                    Err(e) => {
                        device.close();
                        detach(&targets);
                        self.state = DeviceState::Closed;
                        tracing::error!(error = %e, "Camera session configuration failed");
                        Err(configure_failed(e).into())
                    }
                }
            }
            DeviceEvent::Disconnected => {
                self.state = DeviceState::Closed;
                tracing::warn!("Camera disconnected while opening");
                Err(CameraError::Disconnected.into())
            }
            DeviceEvent::Error(e) => {
                self.state = DeviceState::Closed;
                tracing::error!(error = %e, "Camera reported an error while opening");
                Err(e.into())
            }
        }
    }

    /// Closes session, device and stream targets, in that order.
    ///
    /// Blocks while an open is outstanding. Closing a closed controller is
    /// a no-op.
    pub fn close(&mut self) -> Result<(), ControllerError> {
        self.lock.acquire()?;

        if let Some(mut handle) = self.handle.take() {
            handle.session.close();
            handle.device.close();
            tracing::info!(camera = %handle.device.id(), "Camera closed");
        }
        detach(&self.targets);
        self.targets.clear();
        self.state = DeviceState::Closed;

        self.lock.release();
        Ok(())
    }
}

fn configure_failed(e: CameraError) -> CameraError {
    match e {
        CameraError::ConfigureFailed(_) => e,
        other => CameraError::ConfigureFailed(other.to_string()),
    }
}

fn detach(targets: &[StreamTarget]) {
    for target in targets {
        if let StreamTarget::Frames { listener, .. } = target {
            listener.detach();
        }
    }
}
