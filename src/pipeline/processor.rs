//! Background decoding of admitted frames.
//!
//! A single worker thread owns the decoder and handles one frame at a
//! time. Each admitted frame travels with its [`GatePermit`]; the outcome
//! is handed back together with the permit so the control context can
//! deliver the result before the gate reopens.

use super::gate::GatePermit;
use super::stats::PipelineStats;
use crate::capture::Frame;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Routine decoder failures: the frame held no readable symbol.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DecodeMiss {
    #[error("no symbol found")]
    NotFound,
    #[error("symbol checksum mismatch")]
    ChecksumMismatch,
    #[error("symbol format invalid")]
    FormatInvalid,
}

/// Symbol decoder operating on a luma plane.
pub trait Decoder: Send {
    /// Decodes the symbol in a `width` x `height` luma buffer.
    fn decode(&mut self, luma: &[u8], width: u32, height: u32) -> Result<String, DecodeMiss>;

    /// Clears any state carried over from the previous frame. Must be
    /// idempotent.
    fn reset(&mut self);
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
    fn decode(&mut self, luma: &[u8], width: u32, height: u32) -> Result<String, DecodeMiss> {
        (**self).decode(luma, width, height)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// An admitted frame on its way to the worker.
#[derive(Debug)]
pub struct FrameJob {
    pub frame: Frame,
    pub permit: GatePermit,
}

/// What decoding one frame produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Decoded(String),
    Miss(DecodeMiss),
    /// The decoder panicked. Handled like a miss.
    Fault(String),
}

/// A settled frame. The frame itself is already released; the permit is
/// still held.
#[derive(Debug)]
pub struct ProcessedFrame {
    pub sequence: u64,
    pub outcome: DecodeOutcome,
    pub permit: GatePermit,
}

enum WorkerMessage {
    Job(FrameJob),
    Shutdown,
}

/// Cloneable handle for submitting jobs to the worker.
#[derive(Clone)]
pub struct JobSender {
    tx: Sender<WorkerMessage>,
}

impl JobSender {
    /// Queues `job`. If the worker is gone the job is returned and the
    /// caller drops it, releasing frame and permit.
    pub fn submit(&self, job: FrameJob) -> Result<(), FrameJob> {
        self.tx.send(WorkerMessage::Job(job)).map_err(|e| match e.0 {
            WorkerMessage::Job(job) => job,
            WorkerMessage::Shutdown => unreachable!("only jobs are submitted here"),
        })
    }
}

/// Owns the decoding worker thread.
pub struct FrameProcessor {
    jobs: JobSender,
    worker: Option<JoinHandle<()>>,
}

impl FrameProcessor {
    /// Starts the worker. `deliver` runs on the worker thread for every
    /// settled frame.
    pub fn spawn<D, F>(decoder: D, stats: Arc<PipelineStats>, deliver: F) -> std::io::Result<Self>
    where
        D: Decoder + 'static,
        F: Fn(ProcessedFrame) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("scanner-decode".into())
            .spawn(move || run_worker(decoder, rx, stats, deliver))?;

        Ok(Self {
            jobs: JobSender { tx },
            worker: Some(worker),
        })
    }

    pub fn sender(&self) -> JobSender {
        self.jobs.clone()
    }

    /// Stops the worker after the job it is on and joins it.
    pub fn shutdown(&mut self) {
        let _ = self.jobs.tx.send(WorkerMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Decode worker panicked");
            }
        }
    }
}

impl Drop for FrameProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<D, F>(mut decoder: D, rx: Receiver<WorkerMessage>, stats: Arc<PipelineStats>, deliver: F)
where
    D: Decoder,
    F: Fn(ProcessedFrame),
{
    tracing::debug!("Decode worker started");
    for message in rx {
        match message {
            WorkerMessage::Job(job) => deliver(process_frame(&mut decoder, job, &stats)),
            WorkerMessage::Shutdown => break,
        }
    }
    decoder.reset();
    tracing::debug!("Decode worker stopped");
}

/// Resets the decoder and releases the frame when dropped, whichever way
/// decoding ends.
struct InFlight<'a, D: Decoder> {
    decoder: &'a mut D,
    frame: Option<Frame>,
}

impl<D: Decoder> InFlight<'_, D> {
    fn decode(&mut self) -> Result<String, DecodeMiss> {
        match self.frame.as_ref() {
            Some(frame) if !frame.is_valid() => Err(DecodeMiss::FormatInvalid),
            Some(frame) => self
                .decoder
                .decode(frame.luma_plane(), frame.width(), frame.height()),
            None => Err(DecodeMiss::NotFound),
        }
    }
}

impl<D: Decoder> Drop for InFlight<'_, D> {
    fn drop(&mut self) {
        self.decoder.reset();
        drop(self.frame.take());
    }
}

/// Decodes one admitted frame.
pub fn process_frame<D: Decoder>(decoder: &mut D, job: FrameJob, stats: &PipelineStats) -> ProcessedFrame {
    let FrameJob { frame, permit } = job;
    let sequence = frame.sequence();
    let captured = frame.timestamp();

    let mut in_flight = InFlight {
        decoder,
        frame: Some(frame),
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| in_flight.decode()));
    drop(in_flight);

    let outcome = match result {
        Ok(Ok(text)) => {
            PipelineStats::bump(&stats.decode_hits);
            tracing::debug!(
                sequence,
                latency_us = captured.elapsed().as_micros() as u64,
                "Decoded symbol"
            );
            DecodeOutcome::Decoded(text)
        }
        Ok(Err(miss)) => {
            PipelineStats::bump(&stats.decode_misses);
            tracing::trace!(
                sequence,
                latency_us = captured.elapsed().as_micros() as u64,
                reason = %miss,
                "Decode miss"
            );
            DecodeOutcome::Miss(miss)
        }
        Err(payload) => {
            PipelineStats::bump(&stats.decode_faults);
            let message = panic_message(payload.as_ref());
            tracing::warn!(sequence, error = %message, "Decoder fault");
            DecodeOutcome::Fault(message)
        }
    };

    ProcessedFrame {
        sequence,
        outcome,
        permit,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "decoder panicked".to_string()
    }
}
