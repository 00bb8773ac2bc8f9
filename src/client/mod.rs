//! Consumer side of the job stream.
//!
//! Bytes come off the wire, [`decode_frames`] turns them into frames, and a
//! [`Reconstructor`] folds those into an [`ExecutionState`] one at a time.
//! [`JobClient`] wires the three together over HTTP.

mod frames;
mod http;
mod reconstructor;
mod state;

pub use frames::{decode_frames, Frame, FrameStream, TransportError};
pub use http::{JobClient, JobSession, JOB_ID_HEADER};
pub use reconstructor::{DrainOutcome, Reconstructor};
pub use state::{ExecutionState, FoldOutcome, StateSummary, StreamPhase};
