//! Preview and scanning lifecycle.
//!
//! [`BarcodeScanner`] is the entry point. Lifecycle requests, surface
//! changes, device answers and decode outcomes are all applied by one
//! [`SessionStateMachine`] on the scanner's control thread, so state is
//! never written concurrently.

mod events;
mod machine;
mod scanner;
mod state;
mod surface;

pub use events::{ScannerError, ScannerEvent};
pub use machine::{ControlEvent, Flow, SessionStateMachine};
pub use scanner::{BarcodeScanner, StartError};
pub use state::SessionState;
pub use surface::{HeadlessSurface, PreviewSurface, SurfaceRecord};
