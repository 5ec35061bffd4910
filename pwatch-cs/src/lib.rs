//! pwatch-cs library interface
//!
//! Post classification service: searches posts per keyword, filters them, and
//! classifies them in throttled batches while streaming each result to the
//! client as soon as it is known.

pub mod api;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod session;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use pipeline::Pipeline;
use session::SessionRegistry;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Collaborators and pipeline configuration, read-only
    pub pipeline: Arc<Pipeline>,
    /// Live sessions
    pub registry: SessionRegistry,
    /// Parent of every session token; cancelled on shutdown
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last run-terminating error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            registry: SessionRegistry::new(),
            shutdown: CancellationToken::new(),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Largest accepted `data_num`
    pub fn max_data_num(&self) -> usize {
        self.pipeline.config().max_data_num
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::classify_routes())
        .merge(api::socket_routes())
        .merge(api::session_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
