//! Single-slot admission control.
//!
//! The gate answers one question for every frame the sensor produces:
//! may this frame be decoded now? It holds no queue. A frame is admitted
//! only while scanning is enabled and no other frame is being processed;
//! everything else is dropped by the caller.
//!
//! Two atomics carry the state:
//!
//! - `control` packs the scanning flag (bit 0) with a scan epoch (upper
//!   bits). Every open or close bumps the epoch, so a permit can later be
//!   checked against the scanning period it was admitted in.
//! - `busy` is the slot itself, claimed with a compare-exchange and
//!   cleared when the [`GatePermit`] is dropped.

use super::stats::PipelineStats;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

const OPEN_BIT: u64 = 1;

/// Why a frame was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Scanning is disabled.
    Idle,
    /// A previous frame is still being processed.
    Busy,
}

/// Result of [`BackpressureGate::try_admit`].
#[derive(Debug)]
pub enum Admission {
    Admitted(GatePermit),
    Dropped(DropReason),
}

#[derive(Debug)]
struct GateState {
    control: AtomicU64,
    busy: AtomicBool,
    stats: Arc<PipelineStats>,
}

/// Single-slot admission gate shared between producer and consumers.
#[derive(Debug, Clone)]
pub struct BackpressureGate {
    state: Arc<GateState>,
}

impl BackpressureGate {
    /// Creates a closed gate.
    pub fn new(stats: Arc<PipelineStats>) -> Self {
        Self {
            state: Arc::new(GateState {
                control: AtomicU64::new(0),
                busy: AtomicBool::new(false),
                stats,
            }),
        }
    }

    /// Enables admission and starts a new epoch. Returns the epoch.
    pub fn open(&self) -> u64 {
        self.advance(true)
    }

    /// Disables admission and starts a new epoch, invalidating every
    /// outstanding permit.
    pub fn close(&self) -> u64 {
        self.advance(false)
    }

    fn advance(&self, open: bool) -> u64 {
        let bit = if open { OPEN_BIT } else { 0 };
        let previous = self
            .state
            .control
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some((((c >> 1) + 1) << 1) | bit)
            })
            .unwrap_or_else(|c| c);
        (previous >> 1) + 1
    }

    pub fn is_open(&self) -> bool {
        self.state.control.load(Ordering::Acquire) & OPEN_BIT != 0
    }

    pub fn epoch(&self) -> u64 {
        self.state.control.load(Ordering::Acquire) >> 1
    }

    /// Returns true while an admitted frame has not been settled.
    pub fn is_busy(&self) -> bool {
        self.state.busy.load(Ordering::Acquire)
    }

    /// Decides whether a new frame may be processed. Never blocks.
    pub fn try_admit(&self) -> Admission {
        let control = self.state.control.load(Ordering::Acquire);
        if control & OPEN_BIT == 0 {
            PipelineStats::bump(&self.state.stats.frames_dropped_idle);
            return Admission::Dropped(DropReason::Idle);
        }

        if self
            .state
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            PipelineStats::bump(&self.state.stats.frames_dropped_busy);
            return Admission::Dropped(DropReason::Busy);
        }

        PipelineStats::bump(&self.state.stats.frames_admitted);
        Admission::Admitted(GatePermit {
            state: Arc::clone(&self.state),
            epoch: control >> 1,
        })
    }

    /// Returns true if `permit` was admitted during the current scanning
    /// period and scanning is still enabled.
    pub fn is_current(&self, permit: &GatePermit) -> bool {
        let control = self.state.control.load(Ordering::Acquire);
        control & OPEN_BIT != 0 && control >> 1 == permit.epoch
    }
}

/// Proof that a frame holds the gate's single slot.
///
/// Dropping the permit frees the slot, so it reopens exactly once per
/// admitted frame.
#[derive(Debug)]
pub struct GatePermit {
    state: Arc<GateState>,
    epoch: u64,
}

impl GatePermit {
    /// Epoch the frame was admitted in.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.state.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn gate() -> (BackpressureGate, Arc<PipelineStats>) {
        let stats = Arc::new(PipelineStats::new());
        (BackpressureGate::new(Arc::clone(&stats)), stats)
    }

    #[test]
    fn test_closed_gate_drops_idle() {
        let (gate, stats) = gate();
        assert!(matches!(gate.try_admit(), Admission::Dropped(DropReason::Idle)));
        assert_eq!(stats.snapshot().frames_dropped_idle, 1);
    }

    #[test]
    fn test_single_slot() {
        let (gate, stats) = gate();
        gate.open();

        let permit = match gate.try_admit() {
            Admission::Admitted(permit) => permit,
            other => panic!("expected admission, got {:?}", other),
        };
        assert!(gate.is_busy());
        assert!(matches!(gate.try_admit(), Admission::Dropped(DropReason::Busy)));

        drop(permit);
        assert!(!gate.is_busy());
        assert!(matches!(gate.try_admit(), Admission::Admitted(_)));

        let counters = stats.snapshot();
        assert_eq!(counters.frames_admitted, 2);
        assert_eq!(counters.frames_dropped_busy, 1);
    }

    #[test]
    fn test_reopen_does_not_free_slot() {
        let (gate, _) = gate();
        gate.open();
        let permit = match gate.try_admit() {
            Admission::Admitted(permit) => permit,
            other => panic!("expected admission, got {:?}", other),
        };

        gate.close();
        gate.open();
        assert!(matches!(gate.try_admit(), Admission::Dropped(DropReason::Busy)));
        assert!(!gate.is_current(&permit));
    }

    #[test]
    fn test_epochs_advance() {
        let (gate, _) = gate();
        assert_eq!(gate.open(), 1);
        assert!(gate.is_open());
        assert_eq!(gate.close(), 2);
        assert!(!gate.is_open());
        assert_eq!(gate.open(), 3);
        assert_eq!(gate.epoch(), 3);
    }

    #[test]
    fn test_permit_current_until_close() {
        let (gate, _) = gate();
        gate.open();
        let permit = match gate.try_admit() {
            Admission::Admitted(permit) => permit,
            other => panic!("expected admission, got {:?}", other),
        };
        assert!(gate.is_current(&permit));
        gate.close();
        assert!(!gate.is_current(&permit));
    }

    #[test]
    fn test_concurrent_admission_holds_one_slot() {
        let (gate, stats) = gate();
        gate.open();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let in_flight = Arc::clone(&in_flight);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..500 {
                        if let Admission::Admitted(permit) = gate.try_admit() {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::yield_now();
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            drop(permit);
                        }
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        let counters = stats.snapshot();
        assert_eq!(
            counters.frames_admitted + counters.frames_dropped_busy,
            8 * 500
        );
    }
}
