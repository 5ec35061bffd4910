//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE helpers for pwatch event streams.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::warn;

/// Interval between keep-alive comments on idle streams
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Build a named event with a JSON payload
///
/// Returns `None` (and logs) when the payload cannot be serialized.
pub fn json_event<T: Serialize>(event_type: &str, payload: &T) -> Option<Event> {
    match serde_json::to_string(payload) {
        Ok(data) => Some(Event::default().event(event_type).data(data)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}

/// Wrap an event stream with the standard heartbeat keep-alive
///
/// Long backoff and cooldown pauses produce no events for tens of seconds;
/// the heartbeat keeps intermediaries from closing the connection.
pub fn with_heartbeat<S>(stream: S) -> Sse<S>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload {
        url: String,
    }

    #[test]
    fn test_json_event_serializes_payload() {
        let event = json_event(
            "outcome",
            &Payload {
                url: "https://example.com".to_string(),
            },
        );
        assert!(event.is_some());
    }
}
