//! Camera access, device ownership and frame handling.
//!
//! This module provides the device-facing half of the scanner: camera
//! enumeration and selection, the controller that owns the opened device
//! and its session, and the frame type that carries a release obligation.

mod camera;
mod config;
mod controller;
mod frame;
mod mock;
#[cfg(feature = "camera")]
mod native;

pub use camera::{
    select_camera, AutofocusMode, CameraDevice, CameraError, CameraId, CameraIdentity,
    CameraManager, CaptureRequest, CaptureSession, DeviceCallback, DeviceEvent, Facing,
    FrameListener, StreamTarget,
};
pub use config::{ConfigError, FileConfig, MetricsConfig, ScannerConfig};
pub use controller::{
    CaptureDeviceController, ControllerError, DeviceState, DeviceTransition, OpenCloseLock,
    OpenOutcome, SessionHandle,
};
pub use frame::{Frame, ReleaseFn};
pub use mock::{MockCameraManager, MockStats, OpenBehavior};
#[cfg(feature = "camera")]
pub use native::NativeCameraManager;
