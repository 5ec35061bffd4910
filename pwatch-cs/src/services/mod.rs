//! External collaborators
//!
//! The pipeline only talks to the outside world through these three traits, so
//! every session can run against the real clients or against in-process fakes.

pub mod language_detector;
pub mod openai_client;
pub mod reddit_client;

pub use language_detector::WhatlangDetector;
pub use openai_client::OpenAiClassifier;
pub use reddit_client::RedditClient;

use crate::types::RawDocument;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Source Provider failure (run-terminating)
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Classifier failure
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Throttled by the service; retried by the submitter
    #[error("Rate limited")]
    RateLimited {
        /// Server-provided hint, logged only
        retry_after: Option<Duration>,
    },

    /// Any other failure; terminates the run
    #[error("Classification service error: {0}")]
    Service(String),
}

/// Language could not be determined for a text
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Language detection failed")]
pub struct DetectionFailed;

/// Returns ranked documents for a keyword query, newest first
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<RawDocument>, SourceError>;
}

/// Returns the label given a system/user prompt pair
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ClassifyError>;
}

/// Detects the language of a text as an ISO 639-1 code where one exists
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Result<String, DetectionFailed>;
}
