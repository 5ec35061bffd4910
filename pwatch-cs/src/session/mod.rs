//! Connection session
//!
//! A `Session` owns exactly one run of the pipeline: its document list, its
//! batches and the retry state of every document live and die inside
//! [`Session::run`]. The registry only ever sees the session id, state and
//! cancellation token.
//!
//! State machine: `Idle → Extracting → Classifying → Streaming → Closed`, plus
//! `* → Closed` on cancellation or error.

pub mod registry;

pub use registry::{SessionRegistry, SessionSnapshot, Transport};

use crate::pipeline::{batch, Emitter, Pipeline, PipelineError, SubmitStatus};
use crate::types::{ClassificationOutcome, RunReport};
use pwatch_common::api::ClassifyRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, waiting for a request payload
    Idle,
    /// Querying the Source Provider and filtering
    Extracting,
    /// Batching the filtered documents
    Classifying,
    /// Submitting documents; outcomes flow to the emitter
    Streaming,
    /// Terminal
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Extracting) | (Extracting, Classifying) | (Classifying, Streaming) => true,
            _ => false,
        }
    }
}

/// How a run ended without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Completed(RunReport),
    Cancelled,
}

/// Phase milestones reported to the client (socket status messages)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    Extracting { keywords: Vec<String> },
    Extracted { documents: usize },
}

/// Receives phase milestones; must not block
pub trait PhaseObserver: Send + Sync {
    fn on_phase(&self, session_id: Uuid, event: &PhaseEvent);
}

/// Observer for transports without status messages
impl PhaseObserver for () {
    fn on_phase(&self, _session_id: Uuid, _event: &PhaseEvent) {}
}

/// One run of the pipeline for one client request
pub struct Session {
    id: Uuid,
    state: SessionState,
    token: CancellationToken,
    registry: SessionRegistry,
}

impl Session {
    /// Register a new Idle session under `parent`'s cancellation scope
    pub fn open(registry: &SessionRegistry, transport: Transport, parent: &CancellationToken) -> Self {
        let (id, token) = registry.open(transport, parent);
        tracing::debug!(session_id = %id, transport = ?transport, "Session opened");
        Self {
            id,
            state: SessionState::Idle,
            token,
            registry: registry.clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn transition_to(&mut self, next: SessionState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(session_id = %self.id, from = ?self.state, to = ?next, "Session state change");
        self.state = next;
        self.registry.set_state(self.id, next);
        Ok(())
    }

    fn close(&mut self) {
        if self.state != SessionState::Closed {
            let _ = self.transition_to(SessionState::Closed);
        }
    }

    /// Drive the run to completion, cancellation or failure
    ///
    /// The session is always `Closed` (and unregistered) when this returns.
    pub async fn run(
        mut self,
        pipeline: &Pipeline,
        request: &ClassifyRequest,
        outcomes: mpsc::Sender<ClassificationOutcome>,
        observer: &dyn PhaseObserver,
    ) -> Result<SessionEnd, PipelineError> {
        let result = self.drive(pipeline, request, outcomes, observer).await;
        self.close();

        match &result {
            Ok(SessionEnd::Completed(report)) => tracing::info!(
                session_id = %self.id,
                documents = report.documents,
                classified = report.classified,
                dropped = report.dropped,
                matched = report.matched.len(),
                "Session completed"
            ),
            Ok(SessionEnd::Cancelled) => tracing::info!(session_id = %self.id, "Session cancelled"),
            Err(e) => tracing::error!(session_id = %self.id, error = %e, "Session failed"),
        }

        result
    }

    async fn drive(
        &mut self,
        pipeline: &Pipeline,
        request: &ClassifyRequest,
        outcomes: mpsc::Sender<ClassificationOutcome>,
        observer: &dyn PhaseObserver,
    ) -> Result<SessionEnd, PipelineError> {
        self.transition_to(SessionState::Extracting)?;
        observer.on_phase(
            self.id,
            &PhaseEvent::Extracting {
                keywords: request.keywords.clone(),
            },
        );

        let documents = match pipeline
            .extract(self.id, &request.keywords, request.limit(), &self.token)
            .await?
        {
            Some(documents) if !self.token.is_cancelled() => documents,
            _ => return Ok(SessionEnd::Cancelled),
        };
        observer.on_phase(
            self.id,
            &PhaseEvent::Extracted {
                documents: documents.len(),
            },
        );

        self.transition_to(SessionState::Classifying)?;
        let batches = batch(documents, pipeline.config().batch_size)?;

        self.transition_to(SessionState::Streaming)?;
        let instruction = request
            .instruction
            .as_deref()
            .unwrap_or(&pipeline.config().instruction);

        match pipeline
            .submitter()
            .submit(batches, instruction, &outcomes, &self.token)
            .await?
        {
            SubmitStatus::Completed(report) => Ok(SessionEnd::Completed(report)),
            SubmitStatus::Cancelled(report) => {
                tracing::debug!(
                    session_id = %self.id,
                    delivered = report.classified,
                    "Submission stopped by cancellation"
                );
                Ok(SessionEnd::Cancelled)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Start a session task and return its id with the reading end
///
/// A run-terminating error is also recorded in `last_error`.
pub fn spawn_session(
    pipeline: Arc<Pipeline>,
    registry: &SessionRegistry,
    transport: Transport,
    parent: &CancellationToken,
    request: ClassifyRequest,
    observer: Arc<dyn PhaseObserver>,
    last_error: Arc<RwLock<Option<String>>>,
) -> (Uuid, Emitter) {
    let session = Session::open(registry, transport, parent);
    let id = session.id();
    let token = session.token().clone();
    let (tx, rx) = mpsc::channel(pipeline.config().channel_capacity);

    let run = tokio::spawn(async move {
        let result = session.run(&pipeline, &request, tx, observer.as_ref()).await;
        if let Err(e) = &result {
            *last_error.write().await = Some(e.to_string());
        }
        result
    });

    (id, Emitter::new(rx, run, token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use SessionState::*;
        assert!(Idle.can_transition_to(Extracting));
        assert!(Extracting.can_transition_to(Classifying));
        assert!(Classifying.can_transition_to(Streaming));
        assert!(Streaming.can_transition_to(Closed));
    }

    #[test]
    fn test_any_live_state_can_close() {
        use SessionState::*;
        for state in [Idle, Extracting, Classifying, Streaming] {
            assert!(state.can_transition_to(Closed), "{:?}", state);
        }
    }

    #[test]
    fn test_illegal_transitions() {
        use SessionState::*;
        assert!(!Idle.can_transition_to(Streaming));
        assert!(!Streaming.can_transition_to(Extracting));
        assert!(!Closed.can_transition_to(Idle));
        assert!(!Closed.can_transition_to(Closed));
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = SessionRegistry::new();
        let root = CancellationToken::new();
        let session = Session::open(&registry, Transport::Ndjson, &root);
        assert_eq!(registry.len(), 1);
        drop(session);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionState::Streaming).unwrap(),
            "\"streaming\""
        );
    }
}
