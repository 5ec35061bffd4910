//! # pwatch Common Library
//!
//! Shared code for the pwatch workspace including:
//! - Configuration model and resolution
//! - API request/response wire types
//! - Server-Sent Events helpers
//! - Common error type

pub mod api;
pub mod config;
pub mod error;
pub mod sse;

pub use error::{Error, Result};
