//! Core document and outcome types
//!
//! Every value here is scoped to a single session run and never shared
//! between sessions.

use pwatch_common::api::OutcomeFrame;
use serde::{Deserialize, Serialize};

/// Document as returned by the Source Provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    pub title: String,
    pub url: String,
    pub body: String,
}

impl RawDocument {
    pub fn new(title: impl Into<String>, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            body: body.into(),
        }
    }
}

/// Document that passed the filter, body cut to the character budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub url: String,
    pub truncated_body: String,
}

/// Ordered group of documents processed between two cooldowns
pub type Batch = Vec<Document>;

/// Result of classifying one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    /// 1-based position in the run's document list
    pub index: usize,
    pub title: String,
    pub url: String,
    pub label: bool,
    /// Classifier calls made for this document, including the successful one
    pub attempts: u32,
}

impl From<&ClassificationOutcome> for OutcomeFrame {
    fn from(outcome: &ClassificationOutcome) -> Self {
        OutcomeFrame {
            index: outcome.index,
            title: outcome.title.clone(),
            url: outcome.url.clone(),
            dangerous: outcome.label,
        }
    }
}

/// Summary of a run whose batches were all attempted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Documents handed to the submitter
    pub documents: usize,
    /// Documents that produced an outcome
    pub classified: usize,
    /// Documents dropped after exhausting retries
    pub dropped: usize,
    /// URLs labelled affirmative, in submission order
    pub matched: Vec<String>,
}
