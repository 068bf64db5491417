//! Preview and scanning lifecycle states.

use serde::Serialize;
use std::fmt;

/// Lifecycle state of the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    /// Never started.
    #[default]
    Idle,
    /// Preview requested, waiting for the rendering surface.
    PreviewPending,
    /// Device open requested, waiting for the device's answer.
    Opening,
    /// Session live, frames are not admitted.
    PreviewActive,
    /// Session live, frames are admitted to the decoder.
    Scanning,
    /// Preview was stopped and the device closed.
    Stopped,
}

impl SessionState {
    /// True for every state `stop_preview` has to unwind.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::PreviewPending
                | SessionState::Opening
                | SessionState::PreviewActive
                | SessionState::Scanning
        )
    }

    /// True exactly when a live device session exists.
    pub fn has_session(self) -> bool {
        matches!(self, SessionState::PreviewActive | SessionState::Scanning)
    }

    /// True while the preview is starting but not yet live.
    pub fn is_starting(self) -> bool {
        matches!(self, SessionState::PreviewPending | SessionState::Opening)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::PreviewPending => "preview-pending",
            SessionState::Opening => "opening",
            SessionState::PreviewActive => "preview-active",
            SessionState::Scanning => "scanning",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
