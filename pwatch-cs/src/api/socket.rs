//! WebSocket session endpoint
//!
//! One connection carries any number of sequential runs. Each run is a fresh
//! session with its own documents and retry state; the connection only keeps
//! the id of the run in progress so a cancel message can reach it.
//!
//! Connection lifecycle:
//! 1. Server sends "connection established"
//! 2. Client sends a request payload; the server answers with phase status
//!    messages, one message per outcome, the completion status and the matched
//!    URL list, then "send new data to process"
//! 3. `{"action": "cancel"}` stops the run in progress
//! 4. Disconnect cancels whatever is running

use crate::pipeline::{Emitter, Frame};
use crate::session::{spawn_session, PhaseEvent, PhaseObserver, Transport};
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use pwatch_common::api::{
    ClassifyRequest, ClientMessage, ErrorFrame, MatchedResponse, OutcomeFrame, StatusMessage,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Server → client message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Status(StatusMessage),
    Outcome(OutcomeFrame),
    Error(ErrorFrame),
    Matched(MatchedResponse),
}

impl ServerMessage {
    fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorFrame {
            error: message.into(),
        })
    }
}

type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Relays phase milestones as status messages
struct StatusRelay {
    outbound: Outbound,
}

impl PhaseObserver for StatusRelay {
    fn on_phase(&self, _session_id: Uuid, event: &PhaseEvent) {
        let status = match event {
            PhaseEvent::Extracting { keywords } => StatusMessage::extracting(keywords),
            PhaseEvent::Extracted { documents } => StatusMessage::extracted(*documents),
        };
        let _ = self.outbound.send(ServerMessage::Status(status));
    }
}

/// The run currently owned by a connection
struct ActiveRun {
    session_id: Uuid,
    forwarder: JoinHandle<()>,
}

impl ActiveRun {
    /// The session leaves the registry before its last frame is forwarded
    fn is_running(&self, state: &AppState) -> bool {
        state.registry.state(self.session_id).is_some()
    }
}

/// GET /ws
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Main WebSocket connection handler
///
/// Spawns a writer task for channel→socket forwarding, then runs the receive
/// loop until disconnect or shutdown.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let connection = state.shutdown.child_token();
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    tracing::info!(connection_id = %connection_id, "WebSocket connection opened");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::warn!("WebSocket: Failed to serialize message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let _ = outbound.send(ServerMessage::Status(StatusMessage::connected()));

    let mut active: Option<ActiveRun> = None;

    loop {
        tokio::select! {
            _ = connection.cancelled() => break,

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_text(&state, connection_id, &connection, &outbound, &mut active, &text).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket receive error");
                    break;
                }
                _ => {} // Ping/Pong handled by axum/tungstenite
            }
        }
    }

    // Disconnect is a normal end: cancel silently and let the run wind down
    let cancelled = state.registry.cancel_connection(connection_id);
    connection.cancel();
    if let Some(run) = active.take() {
        let _ = run.forwarder.await;
    }
    drop(outbound);
    let _ = writer.await;

    tracing::info!(
        connection_id = %connection_id,
        cancelled_sessions = cancelled,
        "WebSocket connection closed"
    );
}

async fn handle_text(
    state: &AppState,
    connection_id: Uuid,
    connection: &CancellationToken,
    outbound: &Outbound,
    active: &mut Option<ActiveRun>,
    text: &str,
) {
    let running = active
        .as_ref()
        .filter(|run| run.is_running(state))
        .map(|run| run.session_id);

    match ClientMessage::parse(text, state.max_data_num()) {
        Ok(ClientMessage::Run(_)) if running.is_some() => {
            let _ = outbound.send(ServerMessage::error(
                "a run is already in progress; cancel it or wait for it to finish",
            ));
        }
        Ok(ClientMessage::Run(request)) => {
            // Let the previous run finish writing its closing messages first
            if let Some(previous) = active.take() {
                let _ = previous.forwarder.await;
            }
            *active = Some(start_run(state, connection_id, connection, outbound, request));
        }
        Ok(ClientMessage::Cancel) => match running {
            Some(session_id) => {
                tracing::info!(session_id = %session_id, "Cancel requested by client");
                state.registry.cancel(session_id);
            }
            None => {
                let _ = outbound.send(ServerMessage::error("no run in progress"));
            }
        },
        Err(e) => {
            let _ = outbound.send(ServerMessage::error(e.to_string()));
        }
    }
}

fn start_run(
    state: &AppState,
    connection_id: Uuid,
    connection: &CancellationToken,
    outbound: &Outbound,
    request: ClassifyRequest,
) -> ActiveRun {
    let observer = Arc::new(StatusRelay {
        outbound: outbound.clone(),
    });
    let (session_id, emitter) = spawn_session(
        state.pipeline.clone(),
        &state.registry,
        Transport::Socket { connection_id },
        connection,
        request,
        observer,
        state.last_error.clone(),
    );
    tracing::info!(connection_id = %connection_id, session_id = %session_id, "Socket run started");

    ActiveRun {
        session_id,
        forwarder: tokio::spawn(forward_frames(emitter, outbound.clone())),
    }
}

/// Write one run's frames, then invite the next request
async fn forward_frames(emitter: Emitter, outbound: Outbound) {
    let frames = emitter.into_frames();
    tokio::pin!(frames);

    let mut finished = false;
    while let Some(frame) = frames.next().await {
        match frame {
            Frame::Outcome(outcome) => {
                let _ = outbound.send(ServerMessage::Outcome(outcome));
            }
            Frame::Completed(report) => {
                finished = true;
                let _ = outbound.send(ServerMessage::Status(StatusMessage::completed(
                    report.matched.len(),
                )));
                let _ = outbound.send(ServerMessage::Matched(MatchedResponse {
                    response: report.matched,
                }));
            }
            Frame::Failed(error) => {
                finished = true;
                let _ = outbound.send(ServerMessage::Error(error));
            }
        }
    }

    if !finished {
        let _ = outbound.send(ServerMessage::Status(StatusMessage::cancelled()));
    }
    let _ = outbound.send(ServerMessage::Status(StatusMessage::awaiting()));
}

/// Build WebSocket routes
pub fn socket_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}
