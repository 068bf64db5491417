//! Metrics collection and registry.

use crate::pipeline::PipelineCounters;
use crate::session::SessionState;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of scanner state for metrics update.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScannerSnapshot {
    /// Lifecycle state at the time of the snapshot.
    pub state: SessionState,
    /// Frame pipeline counters.
    pub counters: PipelineCounters,
}

impl ScannerSnapshot {
    /// Takes a snapshot from a running scanner.
    pub fn from_scanner(scanner: &crate::session::BarcodeScanner) -> Self {
        Self {
            state: scanner.state(),
            counters: scanner.counters(),
        }
    }
}

/// Monotonic counter mirrored from an external running total.
struct MirroredCounter(IntCounter);

impl MirroredCounter {
    fn new(name: &str, help: &str, registry: &Registry) -> Result<Self, MetricsError> {
        let counter = IntCounter::new(name, help)?;
        registry.register(Box::new(counter.clone()))?;
        Ok(Self(counter))
    }

    /// Counters never go backwards, so a lower total is ignored.
    fn sync(&self, total: u64) {
        let current = self.0.get();
        if total > current {
            self.0.inc_by(total - current);
        }
    }
}

/// Prometheus metrics registry for scanner monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Session metrics
    scanning: IntGauge,
    preview_active: IntGauge,

    // Frame metrics
    frames_received: MirroredCounter,
    frames_admitted: MirroredCounter,
    frames_superseded: MirroredCounter,
    frames_dropped_busy: MirroredCounter,
    frames_dropped_idle: MirroredCounter,

    // Decode metrics
    decode_hits: MirroredCounter,
    decode_misses: MirroredCounter,
    decode_faults: MirroredCounter,
    results_delivered: MirroredCounter,
    stale_results_discarded: MirroredCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all scanner metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let scanning = IntGauge::new(
            "barcode_scanner_scanning",
            "Whether frames are being decoded (1=scanning, 0=not scanning)",
        )?;
        let preview_active = IntGauge::new(
            "barcode_scanner_preview_active",
            "Whether a camera session is live (1=live, 0=closed)",
        )?;
        registry.register(Box::new(scanning.clone()))?;
        registry.register(Box::new(preview_active.clone()))?;

        let r = &registry;
        Ok(Self {
            frames_received: MirroredCounter::new(
                "barcode_scanner_frames_received_total",
                "Frames delivered by the camera",
                r,
            )?,
            frames_admitted: MirroredCounter::new(
                "barcode_scanner_frames_admitted_total",
                "Frames admitted to the decoder",
                r,
            )?,
            frames_superseded: MirroredCounter::new(
                "barcode_scanner_frames_superseded_total",
                "Frames replaced by a newer frame before pickup",
                r,
            )?,
            frames_dropped_busy: MirroredCounter::new(
                "barcode_scanner_frames_dropped_busy_total",
                "Frames dropped because a decode was in flight",
                r,
            )?,
            frames_dropped_idle: MirroredCounter::new(
                "barcode_scanner_frames_dropped_idle_total",
                "Frames dropped because scanning was disabled",
                r,
            )?,
            decode_hits: MirroredCounter::new(
                "barcode_scanner_decode_hits_total",
                "Frames that decoded to a symbol",
                r,
            )?,
            decode_misses: MirroredCounter::new(
                "barcode_scanner_decode_misses_total",
                "Frames without a readable symbol",
                r,
            )?,
            decode_faults: MirroredCounter::new(
                "barcode_scanner_decode_faults_total",
                "Decoder panics",
                r,
            )?,
            results_delivered: MirroredCounter::new(
                "barcode_scanner_results_delivered_total",
                "Decode results delivered to the caller",
                r,
            )?,
            stale_results_discarded: MirroredCounter::new(
                "barcode_scanner_stale_results_discarded_total",
                "Decode results discarded because scanning stopped",
                r,
            )?,
            registry,
            scanning,
            preview_active,
        })
    }

    /// Updates all metrics from a snapshot of scanner state.
    pub fn update(&self, snapshot: &ScannerSnapshot) {
        let state = snapshot.state;
        self.scanning.set(i64::from(state == SessionState::Scanning));
        self.preview_active.set(i64::from(state.has_session()));

        let c = &snapshot.counters;
        self.frames_received.sync(c.frames_received);
        self.frames_admitted.sync(c.frames_admitted);
        self.frames_superseded.sync(c.frames_superseded);
        self.frames_dropped_busy.sync(c.frames_dropped_busy);
        self.frames_dropped_idle.sync(c.frames_dropped_idle);
        self.decode_hits.sync(c.decode_hits);
        self.decode_misses.sync(c.decode_misses);
        self.decode_faults.sync(c.decode_faults);
        self.results_delivered.sync(c.results_delivered);
        self.stale_results_discarded.sync(c.stale_results_discarded);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
