//! HTTP API handlers for pwatch-cs
//!
//! NDJSON and SSE streaming, the WebSocket session endpoint, session
//! inspection and health.

pub mod classify;
pub mod health;
pub mod sessions;
pub mod socket;

pub use classify::classify_routes;
pub use health::health_routes;
pub use sessions::session_routes;
pub use socket::socket_routes;
