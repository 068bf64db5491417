//! Frame stream target and producer-side admission.

use super::gate::{Admission, BackpressureGate};
use super::processor::{FrameJob, JobSender};
use super::stats::PipelineStats;
use crate::capture::{Frame, FrameListener, StreamTarget};
use crate::geometry::OutputSize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Receives frames from the driver and feeds admitted ones to the worker.
///
/// Runs on the driver's thread. Each call stashes the new frame in a
/// one-frame slot, dropping whatever older frame was still waiting there,
/// then picks up the newest frame and asks the gate whether it may be
/// decoded.
pub struct FrameSource {
    gate: BackpressureGate,
    jobs: JobSender,
    stats: Arc<PipelineStats>,
    pending: Mutex<Option<Frame>>,
    attached: AtomicBool,
}

impl FrameSource {
    pub fn new(gate: BackpressureGate, jobs: JobSender, stats: Arc<PipelineStats>) -> Self {
        Self {
            gate,
            jobs,
            stats,
            pending: Mutex::new(None),
            attached: AtomicBool::new(false),
        }
    }

    /// Attaches the source and returns the stream target to hand to the
    /// capture session.
    pub fn stream_target(self: &Arc<Self>, size: OutputSize) -> StreamTarget {
        self.attached.store(true, Ordering::SeqCst);
        tracing::debug!(width = size.width, height = size.height, "Frame stream attached");
        StreamTarget::Frames {
            size,
            listener: Arc::clone(self) as Arc<dyn FrameListener>,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Replaces the pending frame. The displaced frame, if any, is returned
    /// so it can be released outside the lock.
    fn stash(&self, frame: Frame) -> Option<Frame> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(frame)
    }

    fn acquire_latest(&self) -> Option<Frame> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl FrameListener for FrameSource {
    fn on_frame(&self, frame: Frame) {
        PipelineStats::bump(&self.stats.frames_received);
        if !self.is_attached() {
            return;
        }

        if let Some(stale) = self.stash(frame) {
            PipelineStats::bump(&self.stats.frames_superseded);
            tracing::trace!(sequence = stale.sequence(), "Superseded undelivered frame");
        }

        let Some(frame) = self.acquire_latest() else {
            return;
        };

        match self.gate.try_admit() {
            Admission::Dropped(reason) => {
                tracing::trace!(sequence = frame.sequence(), ?reason, "Dropped frame");
            }
            Admission::Admitted(permit) => {
                tracing::trace!(sequence = frame.sequence(), "Admitted frame");
                if let Err(job) = self.jobs.submit(FrameJob { frame, permit }) {
                    tracing::warn!(sequence = job.frame.sequence(), "Decode worker gone, dropping frame");
                }
            }
        }
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        drop(self.acquire_latest());
        tracing::debug!("Frame stream detached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{DecodeMiss, DecodeOutcome, Decoder, FrameProcessor, ProcessedFrame};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Echo;

    impl Decoder for Echo {
        fn decode(&mut self, luma: &[u8], _w: u32, _h: u32) -> Result<String, DecodeMiss> {
            Ok(luma[0].to_string())
        }

        fn reset(&mut self) {}
    }

    struct Harness {
        source: Arc<FrameSource>,
        gate: BackpressureGate,
        stats: Arc<PipelineStats>,
        processed: mpsc::Receiver<ProcessedFrame>,
        released: Arc<AtomicUsize>,
        _processor: FrameProcessor,
    }

    impl Harness {
        fn new() -> Self {
            let stats = Arc::new(PipelineStats::new());
            let gate = BackpressureGate::new(Arc::clone(&stats));
            let (tx, processed) = mpsc::channel();
            let processor =
                FrameProcessor::spawn(Echo, Arc::clone(&stats), move |p| tx.send(p).unwrap())
                    .unwrap();
            let source = Arc::new(FrameSource::new(
                gate.clone(),
                processor.sender(),
                Arc::clone(&stats),
            ));
            Self {
                source,
                gate,
                stats,
                processed,
                released: Arc::new(AtomicUsize::new(0)),
                _processor: processor,
            }
        }

        fn frame(&self, marker: u8) -> Frame {
            let released = Arc::clone(&self.released);
            Frame::new(vec![marker; 4], 2, 2, marker as u64).with_release(move || {
                released.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[test]
    fn test_unattached_source_releases_frames() {
        let h = Harness::new();
        h.gate.open();
        h.source.on_frame(h.frame(1));

        assert_eq!(h.released.load(Ordering::SeqCst), 1);
        assert_eq!(h.stats.snapshot().frames_admitted, 0);
    }

    #[test]
    fn test_idle_gate_drops_frames() {
        let h = Harness::new();
        let _target = h.source.stream_target(OutputSize::new(2, 2));
        h.source.on_frame(h.frame(1));

        assert_eq!(h.released.load(Ordering::SeqCst), 1);
        assert_eq!(h.stats.snapshot().frames_dropped_idle, 1);
    }

    #[test]
    fn test_busy_gate_drops_until_settled() {
        let h = Harness::new();
        let _target = h.source.stream_target(OutputSize::new(2, 2));
        h.gate.open();

        h.source.on_frame(h.frame(1));
        let first = h.processed.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.outcome, DecodeOutcome::Decoded("1".into()));

        // Permit still held: every newer frame is dropped and released.
        for marker in 2..10 {
            h.source.on_frame(h.frame(marker));
        }
        assert_eq!(h.released.load(Ordering::SeqCst), 9);
        assert_eq!(h.stats.snapshot().frames_dropped_busy, 8);

        drop(first);
        h.source.on_frame(h.frame(10));
        let next = h.processed.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(next.outcome, DecodeOutcome::Decoded("10".into()));
        assert_eq!(next.sequence, 10);
    }

    #[test]
    fn test_detach_releases_pending() {
        let h = Harness::new();
        let _target = h.source.stream_target(OutputSize::new(2, 2));
        assert!(h.source.is_attached());

        h.source.detach();
        assert!(!h.source.is_attached());
        h.gate.open();
        h.source.on_frame(h.frame(3));
        assert_eq!(h.released.load(Ordering::SeqCst), 1);
    }
}
