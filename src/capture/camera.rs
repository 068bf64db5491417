//! Camera device abstraction.
//!
//! This module provides trait-based access to camera hardware, allowing
//! both real devices and mock implementations for testing. Opening a
//! device is asynchronous: the outcome is reported once through a
//! [`DeviceCallback`].

use super::Frame;
use crate::geometry::OutputSize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("camera access failed: {0}")]
    AccessFailed(String),
    #[error("failed to configure capture session: {0}")]
    ConfigureFailed(String),
    #[error("camera disconnected")]
    Disconnected,
    #[error("camera {0} reports no output sizes")]
    NoOutputSizes(String),
}

/// Opaque camera identifier as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraId(String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction the lens faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Front,
    #[default]
    Back,
    External,
}

/// A camera discovered at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraIdentity {
    pub id: CameraId,
    pub facing: Facing,
    /// Supported output resolutions, in the order the platform lists them.
    pub output_sizes: Vec<OutputSize>,
}

/// Terminal outcome of a device open request.
pub enum DeviceEvent {
    Opened(Box<dyn CameraDevice>),
    Disconnected,
    Error(CameraError),
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceEvent::Opened(device) => f.debug_tuple("Opened").field(device.id()).finish(),
            DeviceEvent::Disconnected => f.write_str("Disconnected"),
            DeviceEvent::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

/// Receives exactly one [`DeviceEvent`] per open request.
pub type DeviceCallback = Box<dyn FnOnce(DeviceEvent) + Send>;

/// Receives frames produced by the sensor.
///
/// Called directly on the driver's thread, so implementations must not block.
pub trait FrameListener: Send + Sync {
    fn on_frame(&self, frame: Frame);

    /// Called when the stream target is torn down. Frames arriving
    /// afterwards should be released unprocessed.
    fn detach(&self) {}
}

/// An output the capture session writes into.
#[derive(Clone)]
pub enum StreamTarget {
    /// The on-screen preview surface, with its buffer size.
    Preview { size: OutputSize },
    /// A CPU-readable luma stream delivered to a listener.
    Frames {
        size: OutputSize,
        listener: Arc<dyn FrameListener>,
    },
}

impl fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTarget::Preview { size } => f.debug_struct("Preview").field("size", size).finish(),
            StreamTarget::Frames { size, .. } => f.debug_struct("Frames").field("size", size).finish(),
        }
    }
}

/// Autofocus behaviour for a capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutofocusMode {
    #[default]
    Auto,
    ContinuousPicture,
}

/// Repeating request issued once a session is configured. It targets
/// every stream the session was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureRequest {
    pub autofocus: AutofocusMode,
}

/// Camera enumeration and access.
pub trait CameraManager: Send + Sync {
    /// Lists the identifiers of all cameras.
    fn camera_ids(&self) -> Result<Vec<CameraId>, CameraError>;

    /// Reads the facing and supported output sizes of a camera.
    fn identity(&self, id: &CameraId) -> Result<CameraIdentity, CameraError>;

    /// Requests access to a camera.
    ///
    /// An `Err` means the request was rejected outright and `on_event` will
    /// never run. Otherwise `on_event` runs exactly once, possibly on
    /// another thread.
    fn open(&self, id: &CameraId, on_event: DeviceCallback) -> Result<(), CameraError>;
}

/// An opened camera.
pub trait CameraDevice: Send {
    fn id(&self) -> &CameraId;

    /// Creates a capture session writing into `targets`.
    fn create_session(
        &mut self,
        targets: &[StreamTarget],
    ) -> Result<Box<dyn CaptureSession>, CameraError>;

    /// Closes the device. Safe to call more than once.
    fn close(&mut self);
}

/// A configured capture session.
pub trait CaptureSession: Send {
    /// Starts repeating `request` until the session is closed.
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), CameraError>;

    /// Stops capture and closes the session. Safe to call more than once.
    fn close(&mut self);
}

/// Picks the first camera facing `preferred` that lists at least one
/// output size. When `preferred` is not front, front cameras are skipped
/// and any other facing qualifies.
pub fn select_camera(
    manager: &dyn CameraManager,
    preferred: Facing,
) -> Result<CameraIdentity, CameraError> {
    for id in manager.camera_ids()? {
        let identity = manager.identity(&id)?;

        let facing_ok = match preferred {
            Facing::Front => identity.facing == Facing::Front,
            _ => identity.facing != Facing::Front,
        };
        if !facing_ok {
            tracing::debug!(camera = %id, facing = ?identity.facing, "Skipping camera");
            continue;
        }
        if identity.output_sizes.is_empty() {
            tracing::debug!(camera = %id, "Skipping camera without output sizes");
            continue;
        }

        return Ok(identity);
    }

    Err(CameraError::DeviceNotFound(format!(
        "no camera facing {:?}",
        preferred
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCameraManager;

    #[test]
    fn test_select_skips_front_camera() {
        let manager = MockCameraManager::new()
            .with_camera("0", Facing::Front, vec![OutputSize::new(640, 480)])
            .with_camera("1", Facing::Back, vec![OutputSize::new(1280, 720)]);

        let identity = select_camera(&manager, Facing::Back).unwrap();
        assert_eq!(identity.id, CameraId::new("1"));
    }

    #[test]
    fn test_select_skips_camera_without_sizes() {
        let manager = MockCameraManager::new()
            .with_camera("0", Facing::Back, vec![])
            .with_camera("1", Facing::External, vec![OutputSize::new(640, 480)]);

        let identity = select_camera(&manager, Facing::Back).unwrap();
        assert_eq!(identity.id, CameraId::new("1"));
    }

    #[test]
    fn test_select_front_when_preferred() {
        let manager = MockCameraManager::new()
            .with_camera("0", Facing::Back, vec![OutputSize::new(640, 480)])
            .with_camera("1", Facing::Front, vec![OutputSize::new(640, 480)]);

        let identity = select_camera(&manager, Facing::Front).unwrap();
        assert_eq!(identity.id, CameraId::new("1"));
    }

    #[test]
    fn test_select_without_candidates() {
        let manager =
            MockCameraManager::new().with_camera("0", Facing::Front, vec![OutputSize::new(640, 480)]);

        assert!(matches!(
            select_camera(&manager, Facing::Back),
            Err(CameraError::DeviceNotFound(_))
        ));
    }
}
