//! Notifications delivered to the scanner's caller.

use crate::capture::{CameraError, ControllerError};
use thiserror::Error;

/// Failures surfaced to the caller as notifications.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScannerError {
    /// The device lock was not acquired in time. Retry `start_preview`.
    #[error("timed out waiting to open the camera")]
    TimeoutOpeningDevice,
    #[error("camera hardware access failed: {0}")]
    HardwareAccessFailure(String),
    /// The session could not be configured. The preview was torn down.
    #[error("capture session configuration failed: {0}")]
    SessionConfigureFailed(String),
    /// A lock wait was interrupted. The scanner stops.
    #[error("interrupted while waiting for the camera lock")]
    InterruptedWait,
}

impl From<CameraError> for ScannerError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::ConfigureFailed(msg) => ScannerError::SessionConfigureFailed(msg),
            other => ScannerError::HardwareAccessFailure(other.to_string()),
        }
    }
}

impl From<ControllerError> for ScannerError {
    fn from(e: ControllerError) -> Self {
        match e {
            ControllerError::Timeout { .. } => ScannerError::TimeoutOpeningDevice,
            ControllerError::Interrupted => ScannerError::InterruptedWait,
            ControllerError::AlreadyOpen => ScannerError::HardwareAccessFailure(e.to_string()),
            ControllerError::Camera(e) => e.into(),
        }
    }
}

/// Everything the scanner reports to its caller, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerEvent {
    /// A symbol was decoded while scanning.
    Result(String),
    PreviewStarted,
    PreviewStopped,
    ScanningStarted,
    ScanningStopped,
    Error(ScannerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ScannerError::from(ControllerError::Timeout {
                waited: Duration::from_millis(2500)
            }),
            ScannerError::TimeoutOpeningDevice
        );
        assert_eq!(
            ScannerError::from(ControllerError::Interrupted),
            ScannerError::InterruptedWait
        );
        assert!(matches!(
            ScannerError::from(CameraError::ConfigureFailed("x".into())),
            ScannerError::SessionConfigureFailed(_)
        ));
        assert!(matches!(
            ScannerError::from(ControllerError::Camera(CameraError::Disconnected)),
            ScannerError::HardwareAccessFailure(_)
        ));
    }
}
