//! Live session inspection and cancellation

use crate::error::{ApiError, ApiResult};
use crate::session::SessionSnapshot;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

/// Session list response
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSnapshot>,
}

/// Cancel acknowledgement
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub session_id: Uuid,
    pub cancelled: bool,
}

/// GET /sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.registry.snapshot(),
    })
}

/// POST /sessions/:id/cancel
///
/// The run stops before its next classification call; a call already in
/// flight completes and its result is discarded.
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    if !state.registry.cancel(session_id) {
        return Err(ApiError::NotFound(format!("Session {}", session_id)));
    }

    tracing::info!(session_id = %session_id, "Session cancelled via API");
    Ok(Json(CancelResponse {
        session_id,
        cancelled: true,
    }))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/:id/cancel", post(cancel_session))
}
