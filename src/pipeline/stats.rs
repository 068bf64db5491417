//! Frame pipeline counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by the producer, worker and control contexts.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub(crate) frames_received: AtomicU64,
    pub(crate) frames_superseded: AtomicU64,
    pub(crate) frames_admitted: AtomicU64,
    pub(crate) frames_dropped_busy: AtomicU64,
    pub(crate) frames_dropped_idle: AtomicU64,
    pub(crate) decode_hits: AtomicU64,
    pub(crate) decode_misses: AtomicU64,
    pub(crate) decode_faults: AtomicU64,
    pub(crate) results_delivered: AtomicU64,
    pub(crate) stale_results_discarded: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> PipelineCounters {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineCounters {
            frames_received: load(&self.frames_received),
            frames_superseded: load(&self.frames_superseded),
            frames_admitted: load(&self.frames_admitted),
            frames_dropped_busy: load(&self.frames_dropped_busy),
            frames_dropped_idle: load(&self.frames_dropped_idle),
            decode_hits: load(&self.decode_hits),
            decode_misses: load(&self.decode_misses),
            decode_faults: load(&self.decode_faults),
            results_delivered: load(&self.results_delivered),
            stale_results_discarded: load(&self.stale_results_discarded),
        }
    }
}

/// Snapshot of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineCounters {
    /// Frames handed to the frame source by the driver.
    pub frames_received: u64,
    /// Frames replaced in the pending slot by a newer one before pickup.
    pub frames_superseded: u64,
    /// Frames admitted to the decoder.
    pub frames_admitted: u64,
    /// Frames dropped because a decode was still running.
    pub frames_dropped_busy: u64,
    /// Frames dropped because scanning was disabled.
    pub frames_dropped_idle: u64,
    pub decode_hits: u64,
    pub decode_misses: u64,
    /// Decoder panics; counted separately from misses.
    pub decode_faults: u64,
    pub results_delivered: u64,
    /// Decoded results discarded because scanning had stopped.
    pub stale_results_discarded: u64,
}

impl PipelineCounters {
    /// Total frames dropped at the gate, for either reason.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped_busy + self.frames_dropped_idle
    }
}
