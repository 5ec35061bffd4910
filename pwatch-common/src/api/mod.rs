//! API module for shared wire types
//!
//! Provides the request and response payloads exchanged with clients over
//! HTTP (NDJSON, SSE) and WebSocket.
//!
//! # Design Principle
//!
//! This module contains ONLY:
//! - Shared types
//! - Pure parsing/validation functions (no HTTP framework dependencies)
//!
//! The service wraps these with framework-specific handlers (Axum).

pub mod types;

pub use types::{
    ClassifyRequest, ClientMessage, ErrorFrame, MatchedResponse, OutcomeFrame, StatusMessage,
};
