//! Shared API request/response types
//!
//! Payloads used by both the HTTP streaming endpoints and the WebSocket session.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ========================================
// Request Types
// ========================================

/// Request-initiation payload
///
/// Sent as the HTTP request body or as a WebSocket text message.
///
/// # Examples
///
/// ```
/// use pwatch_common::api::types::ClassifyRequest;
///
/// let request = ClassifyRequest::from_json(r#"{"keywords": ["ai"], "data_num": 5}"#, 100).unwrap();
/// assert_eq!(request.limit(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClassifyRequest {
    /// Search keywords, one Source Provider query each
    pub keywords: Vec<String>,

    /// Per-keyword result limit
    pub data_num: i64,

    /// Optional override of the configured user instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl ClassifyRequest {
    /// Parse and validate a JSON payload
    pub fn from_json(text: &str, max_data_num: usize) -> Result<Self> {
        let request: ClassifyRequest = serde_json::from_str(text)
            .map_err(|e| Error::InvalidInput(format!("Malformed request: {}", e)))?;
        request.validate(max_data_num)?;
        Ok(request)
    }

    /// Parse and validate an already decoded JSON value
    pub fn from_value(value: Value, max_data_num: usize) -> Result<Self> {
        let request: ClassifyRequest = serde_json::from_value(value)
            .map_err(|e| Error::InvalidInput(format!("Malformed request: {}", e)))?;
        request.validate(max_data_num)?;
        Ok(request)
    }

    /// Check keyword list and limit range
    pub fn validate(&self, max_data_num: usize) -> Result<()> {
        if self.keywords.is_empty() {
            return Err(Error::InvalidInput("keywords must not be empty".to_string()));
        }
        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(Error::InvalidInput("keywords must not contain blank entries".to_string()));
        }
        if self.data_num < 1 || self.data_num as u64 > max_data_num as u64 {
            return Err(Error::InvalidInput(format!(
                "data_num must be between 1 and {}, got {}",
                max_data_num, self.data_num
            )));
        }
        Ok(())
    }

    /// Per-keyword limit as a count (valid after `validate`)
    pub fn limit(&self) -> usize {
        self.data_num.max(0) as usize
    }
}

/// Client → server WebSocket message
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Start a new run on this connection
    Run(ClassifyRequest),
    /// Cancel the run in progress
    Cancel,
}

impl ClientMessage {
    /// Decode a text frame
    ///
    /// Objects carrying an `action` field are control messages; anything else
    /// must be a request payload.
    pub fn parse(text: &str, max_data_num: usize) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::InvalidInput(format!("Malformed message: {}", e)))?;

        if let Some(action) = value.get("action") {
            return match action.as_str() {
                Some("cancel") => Ok(ClientMessage::Cancel),
                other => Err(Error::InvalidInput(format!("Unknown action: {:?}", other))),
            };
        }

        ClassifyRequest::from_value(value, max_data_num).map(ClientMessage::Run)
    }
}

// ========================================
// Response Types
// ========================================

/// One classification outcome as delivered to the client
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutcomeFrame {
    /// 1-based position of the document in the run
    pub index: usize,
    pub title: String,
    pub url: String,
    /// Whether the classifier labelled the document a match
    pub dangerous: bool,
}

/// Run-terminating error notification
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ErrorFrame {
    pub error: String,
}

/// Socket status text message
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StatusMessage {
    pub status: String,
}

impl StatusMessage {
    pub fn connected() -> Self {
        Self::new("connection established")
    }

    pub fn extracting(keywords: &[String]) -> Self {
        Self::new(format!("extracting posts for keywords: {}", keywords.join(", ")))
    }

    pub fn extracted(documents: usize) -> Self {
        Self::new(format!("{} posts extracted, processing started", documents))
    }

    pub fn completed(matched: usize) -> Self {
        Self::new(format!("processing completed, {} matched", matched))
    }

    pub fn cancelled() -> Self {
        Self::new("processing cancelled")
    }

    pub fn awaiting() -> Self {
        Self::new("send new data to process")
    }

    fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// Final socket message listing matched URLs in submission order
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MatchedResponse {
    pub response: Vec<String>,
}
