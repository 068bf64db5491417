//! Barcode Capture Library
//!
//! Camera frame acquisition for live barcode scanning. Opens a camera,
//! streams a preview onto a rendering surface and, while scanning is
//! enabled, hands frames one at a time to a pluggable [`Decoder`].
//!
//! # Architecture
//!
//! ```text
//! capture (device, frames) → pipeline (gate, decode worker) → session (events)
//!        ↑                                                        │
//!        └──────────── geometry (output size, transform) ─────────┘
//! ```
//!
//! # Design Principles
//!
//! - **Newest frame wins**: frames arriving while a decode is running are
//!   dropped, never queued
//! - **One writer**: lifecycle state changes only on the control thread
//! - **Frames always released**: every frame handed over by the device is
//!   returned exactly once, whatever the decoder does
//! - **No late results**: nothing decoded is delivered after scanning stops
//!
//! # Example
//!
//! ```no_run
//! use barcode_capture::{
//!     capture::{Facing, MockCameraManager, ScannerConfig},
//!     geometry::{OutputSize, Rotation, ViewSize},
//!     pipeline::{DecodeMiss, Decoder},
//!     session::{BarcodeScanner, HeadlessSurface, ScannerEvent},
//! };
//! use std::sync::Arc;
//!
//! struct NeverFinds;
//!
//! impl Decoder for NeverFinds {
//!     fn decode(&mut self, _: &[u8], _: u32, _: u32) -> Result<String, DecodeMiss> {
//!         Err(DecodeMiss::NotFound)
//!     }
//!     fn reset(&mut self) {}
//! }
//!
//! let camera = Arc::new(MockCameraManager::new().with_camera(
//!     "0",
//!     Facing::Back,
//!     vec![OutputSize::new(640, 480)],
//! ));
//! let surface = HeadlessSurface::new(ViewSize::new(1280, 720), Rotation::Deg0);
//!
//! let (scanner, events) = BarcodeScanner::spawn(
//!     ScannerConfig::default(),
//!     camera,
//!     Box::new(surface),
//!     NeverFinds,
//! )
//! .unwrap();
//!
//! scanner.start_preview();
//! scanner.start_scanning();
//!
//! for event in events {
//!     if let ScannerEvent::Result(text) = event {
//!         println!("decoded {text}");
//!         break;
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod geometry;
pub mod metrics;
pub mod pipeline;
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{CameraManager, FileConfig, Frame, MockCameraManager, ScannerConfig};
pub use geometry::{choose_output_size, compute_transform, OutputSize, ViewSize};
pub use pipeline::{DecodeMiss, Decoder, PipelineCounters};
pub use session::{BarcodeScanner, PreviewSurface, ScannerError, ScannerEvent, SessionState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
