//! Result stream emitter
//!
//! Single consumer of the submitter's outcome channel. Turns outcomes into
//! transport-neutral frames; the HTTP and socket layers only decide how a
//! frame is written.

use super::PipelineError;
use crate::session::SessionEnd;
use crate::types::{ClassificationOutcome, RunReport};
use futures::stream::Stream;
use pwatch_common::api::{ErrorFrame, OutcomeFrame};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

/// One message for the client
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Outcome(OutcomeFrame),
    /// Run-terminating error; always the last frame
    Failed(ErrorFrame),
    /// All batches attempted; always the last frame
    Completed(RunReport),
}

/// Reader side of one session run
pub struct Emitter {
    outcomes: mpsc::Receiver<ClassificationOutcome>,
    run: JoinHandle<Result<SessionEnd, PipelineError>>,
    token: CancellationToken,
    guard: Option<DropGuard>,
}

impl Emitter {
    pub fn new(
        outcomes: mpsc::Receiver<ClassificationOutcome>,
        run: JoinHandle<Result<SessionEnd, PipelineError>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            outcomes,
            run,
            token,
            guard: None,
        }
    }

    /// Cancel the session when the frame stream is dropped
    ///
    /// Used by the HTTP endpoints, where a client disconnect shows up only as
    /// the response body being dropped.
    pub fn cancel_on_drop(mut self) -> Self {
        self.guard = Some(self.token.clone().drop_guard());
        self
    }

    /// Frames in submission order, ending with a terminal frame unless cancelled
    ///
    /// The stream ends only after the session task has returned, cancelled or not.
    pub fn into_frames(self) -> impl Stream<Item = Frame> + Send + 'static {
        let Emitter {
            mut outcomes,
            run,
            token,
            guard,
        } = self;

        async_stream::stream! {
            let _guard = guard;
            let mut cancelled = false;

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        cancelled = true;
                        break;
                    }

                    next = outcomes.recv() => match next {
                        Some(outcome) => {
                            yield Frame::Outcome(OutcomeFrame::from(&outcome));
                        }
                        None => break,
                    }
                }
            }

            // Stop the submitter from queueing anything further
            drop(outcomes);

            if cancelled {
                // The session unregisters when its task returns; an in-flight
                // call is allowed to finish and its result is discarded
                let _ = run.await;
            } else {
                match run.await {
                    Ok(Ok(SessionEnd::Completed(report))) => {
                        if !token.is_cancelled() {
                            yield Frame::Completed(report);
                        }
                    }
                    Ok(Ok(SessionEnd::Cancelled)) => {}
                    Ok(Err(e)) => {
                        yield Frame::Failed(ErrorFrame { error: e.to_string() });
                    }
                    Err(e) => {
                        let error = PipelineError::Task(e.to_string());
                        yield Frame::Failed(ErrorFrame { error: error.to_string() });
                    }
                }
            }
        }
    }
}
