//! The drain loop: folds a frame stream into an [`ExecutionState`].

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::frames::{Frame, TransportError};
use super::state::{ExecutionState, FoldOutcome, StreamPhase};

/// How a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed,
    Failed,
    /// The stream ended or broke before a terminal event.
    Aborted,
    Cancelled,
}

/// Owns the read-model of one job and is its single writer.
pub struct Reconstructor {
    state: ExecutionState,
    cancel: CancellationToken,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconstructor {
    pub fn new() -> Self {
        Self::with_cancel(CancellationToken::new())
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            state: ExecutionState::new(),
            cancel,
        }
    }

    /// Handle for the user's stop action. Cancelling stops the drain
    /// without waiting for the connection to close.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn into_state(self) -> ExecutionState {
        self.state
    }

    /// Clear the state and arm a fresh cancel handle for the next job.
    pub fn reset(&mut self) {
        self.state.reset();
        self.cancel = CancellationToken::new();
    }

    /// Fold frames in arrival order until a terminal event, the end of the
    /// stream, or cancellation. Malformed frames are logged and skipped.
    pub async fn consume<S>(&mut self, mut frames: S) -> DrainOutcome
    where
        S: Stream<Item = Result<Frame, TransportError>> + Unpin,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!(summary = ?self.state.summary(), "job stream cancelled");
                    self.state.mark_cancelled();
                    return DrainOutcome::Cancelled;
                }
                next = frames.next() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "job stream failed");
                    self.state.mark_aborted(e.to_string());
                    return DrainOutcome::Aborted;
                }
                None => {
                    tracing::warn!("job stream closed before a terminal event");
                    self.state
                        .mark_aborted(TransportError::ClosedBeforeTerminal.to_string());
                    return DrainOutcome::Aborted;
                }
            };

            match self.state.apply_frame(&frame) {
                Ok(FoldOutcome::Terminal) => {
                    return match self.state.phase() {
                        StreamPhase::Completed => DrainOutcome::Completed,
                        _ => DrainOutcome::Failed,
                    };
                }
                Ok(FoldOutcome::Applied) => {}
                Ok(FoldOutcome::Ignored) => {
                    tracing::trace!(event = %frame.event, "event ignored");
                }
                Err(e) => {
                    tracing::warn!(event = %frame.event, error = %e, "skipping malformed frame");
                    self.state.record_skipped();
                }
            }
        }
    }
}
