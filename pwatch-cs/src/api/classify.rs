//! HTTP streaming endpoints
//!
//! `POST /chatbot` streams newline-delimited JSON; `POST /chatbot/events` serves
//! the same run as Server-Sent Events. Both return the session id in the
//! `x-session-id` header and cancel the run when the client goes away.

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{Emitter, Frame};
use crate::session::{spawn_session, Transport};
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderName},
    response::{sse::Event, IntoResponse, Response},
    routing::post,
    Router,
};
use futures::{future, StreamExt};
use pwatch_common::api::ClassifyRequest;
use pwatch_common::sse::{json_event, with_heartbeat};
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

/// Header carrying the id of the session serving the response
pub const SESSION_ID_HEADER: HeaderName = HeaderName::from_static("x-session-id");

/// NDJSON content type
pub const NDJSON: &str = "application/x-ndjson";

fn parse_request(state: &AppState, body: &Bytes) -> ApiResult<ClassifyRequest> {
    let text = std::str::from_utf8(body)
        .map_err(|e| ApiError::BadRequest(format!("Request body is not UTF-8: {}", e)))?;
    Ok(ClassifyRequest::from_json(text, state.max_data_num())?)
}

fn start(state: &AppState, transport: Transport, request: ClassifyRequest) -> (Uuid, Emitter) {
    let (id, emitter) = spawn_session(
        state.pipeline.clone(),
        &state.registry,
        transport,
        &state.shutdown,
        request,
        Arc::new(()),
        state.last_error.clone(),
    );
    tracing::info!(session_id = %id, transport = ?transport, "Streaming session started");
    (id, emitter.cancel_on_drop())
}

/// One NDJSON line per outcome or error; completion ends the body silently
pub fn ndjson_line(frame: &Frame) -> Option<Bytes> {
    let encoded = match frame {
        Frame::Outcome(outcome) => serde_json::to_vec(outcome),
        Frame::Failed(error) => serde_json::to_vec(error),
        Frame::Completed(_) => return None,
    };

    match encoded {
        Ok(mut line) => {
            line.push(b'\n');
            Some(Bytes::from(line))
        }
        Err(e) => {
            tracing::warn!("NDJSON: Failed to serialize frame: {}", e);
            None
        }
    }
}

/// `outcome`, `error` and `completed` events
pub fn frame_event(frame: &Frame) -> Option<Event> {
    match frame {
        Frame::Outcome(outcome) => json_event("outcome", outcome),
        Frame::Failed(error) => json_event("error", error),
        Frame::Completed(report) => json_event("completed", report),
    }
}

/// POST /chatbot
pub async fn classify_ndjson(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let request = parse_request(&state, &body)?;
    let (id, emitter) = start(&state, Transport::Ndjson, request);

    let lines = emitter
        .into_frames()
        .filter_map(|frame| future::ready(ndjson_line(&frame).map(Ok::<_, Infallible>)));

    Response::builder()
        .header(header::CONTENT_TYPE, NDJSON)
        .header(SESSION_ID_HEADER, id.to_string())
        .body(Body::from_stream(lines))
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {}", e)))
}

/// POST /chatbot/events
pub async fn classify_events(State(state): State<AppState>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let request = parse_request(&state, &body)?;
    let (id, emitter) = start(&state, Transport::EventStream, request);

    let events = emitter
        .into_frames()
        .filter_map(|frame| future::ready(frame_event(&frame).map(Ok::<_, Infallible>)));

    Ok(([(SESSION_ID_HEADER, id.to_string())], with_heartbeat(events)))
}

/// Build classification routes
pub fn classify_routes() -> Router<AppState> {
    Router::new()
        .route("/chatbot", post(classify_ndjson))
        .route("/chatbot/events", post(classify_events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunReport;
    use pwatch_common::api::{ErrorFrame, OutcomeFrame};

    #[test]
    fn test_ndjson_line_shape() {
        let frame = Frame::Outcome(OutcomeFrame {
            index: 4,
            title: "A post".to_string(),
            url: "https://reddit.com/4".to_string(),
            dangerous: true,
        });
        let line = ndjson_line(&frame).unwrap();
        let text = std::str::from_utf8(&line).unwrap();

        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["index"], 4);
        assert_eq!(value["dangerous"], true);
    }

    #[test]
    fn test_error_line_and_silent_completion() {
        let error = Frame::Failed(ErrorFrame {
            error: "boom".to_string(),
        });
        assert_eq!(ndjson_line(&error).unwrap(), Bytes::from("{\"error\":\"boom\"}\n"));
        assert!(ndjson_line(&Frame::Completed(RunReport::default())).is_none());
    }
}
