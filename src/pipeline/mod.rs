//! Frame admission and decoding.
//!
//! ```text
//! driver thread          worker thread           control thread
//! FrameSource ──gate──►  FrameProcessor ──────►  SessionStateMachine
//!   (drop if busy/idle)    (decode, reset,          (deliver result,
//!                           release frame)           drop permit → gate free)
//! ```
//!
//! At most one frame is in flight at any time: the gate has a single slot
//! and the slot is only freed when the control context drops the permit
//! that came back with the decode outcome.

mod gate;
mod processor;
mod source;
mod stats;

pub use gate::{Admission, BackpressureGate, DropReason, GatePermit};
pub use processor::{
    process_frame, DecodeMiss, DecodeOutcome, Decoder, FrameJob, FrameProcessor, JobSender,
    ProcessedFrame,
};
pub use source::FrameSource;
pub use stats::{PipelineCounters, PipelineStats};
