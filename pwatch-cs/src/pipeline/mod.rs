//! Classification pipeline
//!
//! Source Provider → Filter → Batcher → Submitter → Emitter.
//!
//! A `Pipeline` holds only the collaborators and the immutable configuration;
//! every run gets its own document list, batches and retry state.

pub mod batcher;
pub mod emitter;
pub mod filter;
pub mod retry;
pub mod submitter;

pub use batcher::batch;
pub use emitter::{Emitter, Frame};
pub use filter::{filter_documents, FilterSettings, FilterStats};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use submitter::{SubmitStatus, Submitter};

use crate::services::{ClassifyError, Classifier, LanguageDetector, SourceError, SourceProvider};
use crate::session::SessionState;
use crate::types::Document;
use pwatch_common::config::PipelineConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Run-terminating failure
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Search failed for keyword '{keyword}': {source}")]
    Source {
        keyword: String,
        #[source]
        source: SourceError,
    },

    #[error("Classification failed for document {index}: {source}")]
    Classifier {
        index: usize,
        #[source]
        source: ClassifyError,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Illegal session transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("Session task failed: {0}")]
    Task(String),
}

/// Collaborators plus configuration shared (read-only) by all sessions
pub struct Pipeline {
    source: Arc<dyn SourceProvider>,
    classifier: Arc<dyn Classifier>,
    detector: Arc<dyn LanguageDetector>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn SourceProvider>,
        classifier: Arc<dyn Classifier>,
        detector: Arc<dyn LanguageDetector>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            classifier,
            detector,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn filter_settings(&self) -> FilterSettings {
        FilterSettings {
            language: self.config.language.clone(),
            min_words: self.config.min_words,
            char_budget: self.config.char_budget(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            base_delay: Duration::from_secs(self.config.base_delay_secs),
        }
    }

    pub fn submitter(&self) -> Submitter<'_> {
        Submitter::new(
            self.classifier.as_ref(),
            self.retry_policy(),
            Duration::from_secs(self.config.batch_cooldown_secs),
            &self.config.affirmative_label,
        )
    }

    /// Query the source once per keyword and filter the results
    ///
    /// Returns `Ok(None)` when the session is cancelled between queries.
    pub async fn extract(
        &self,
        session_id: Uuid,
        keywords: &[String],
        limit: usize,
        token: &CancellationToken,
    ) -> Result<Option<Vec<Document>>, PipelineError> {
        let settings = self.filter_settings();
        let mut stats = FilterStats::default();
        let mut documents = Vec::new();

        for keyword in keywords {
            if token.is_cancelled() {
                return Ok(None);
            }

            let raw = self
                .source
                .search(keyword, limit)
                .await
                .map_err(|source| PipelineError::Source {
                    keyword: keyword.clone(),
                    source,
                })?;

            tracing::debug!(
                session_id = %session_id,
                keyword = %keyword,
                fetched = raw.len(),
                "Keyword search returned"
            );

            documents.extend(filter_documents(raw, self.detector.as_ref(), &settings, &mut stats));
        }

        tracing::info!(
            session_id = %session_id,
            accepted = stats.accepted,
            undetected = stats.undetected,
            wrong_language = stats.wrong_language,
            empty = stats.empty,
            bare_link = stats.bare_link,
            too_short = stats.too_short,
            "Extraction complete"
        );

        Ok(Some(documents))
    }
}
