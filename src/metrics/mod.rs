//! Prometheus metrics exporter for scanner monitoring.
//!
//! This module provides observability into the frame pipeline by exposing
//! the scanner's counters in Prometheus format, optionally over HTTP.
//!
//! # Metrics Exposed
//!
//! ## Session Metrics
//! - `barcode_scanner_scanning` - 1 while frames are decoded
//! - `barcode_scanner_preview_active` - 1 while a camera session is live
//!
//! ## Frame Metrics
//! - `barcode_scanner_frames_received_total` - Frames delivered by the camera
//! - `barcode_scanner_frames_admitted_total` - Frames admitted to the decoder
//! - `barcode_scanner_frames_superseded_total` - Frames replaced before pickup
//! - `barcode_scanner_frames_dropped_busy_total` - Dropped while a decode ran
//! - `barcode_scanner_frames_dropped_idle_total` - Dropped while not scanning
//!
//! ## Decode Metrics
//! - `barcode_scanner_decode_hits_total`
//! - `barcode_scanner_decode_misses_total`
//! - `barcode_scanner_decode_faults_total` - Decoder panics
//! - `barcode_scanner_results_delivered_total`
//! - `barcode_scanner_stale_results_discarded_total` - Results after scanning stopped
//!
//! # Example
//!
//! ```no_run
//! use barcode_capture::metrics::{MetricsRegistry, ScannerSnapshot};
//! use barcode_capture::session::SessionState;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = ScannerSnapshot {
//!     state: SessionState::Scanning,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, ScannerSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
