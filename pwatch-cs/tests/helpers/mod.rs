//! Test Helper Utilities
//!
//! In-process fakes for the three collaborators plus builders for pipelines
//! and application state.

#![allow(dead_code)]

use async_trait::async_trait;
use pwatch_common::config::PipelineConfig;
use pwatch_cs::pipeline::Pipeline;
use pwatch_cs::services::{
    Classifier, ClassifyError, DetectionFailed, LanguageDetector, SourceError, SourceProvider,
};
use pwatch_cs::types::RawDocument;
use pwatch_cs::AppState;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Body of `words` English-looking words tagged with `[marker]`
pub fn body(marker: &str, words: usize) -> String {
    let filler = vec!["lorem"; words.saturating_sub(1)].join(" ");
    format!("[{}] {}", marker, filler)
}

/// Raw document that passes the filter; title, URL and marker derive from `id`
pub fn good_doc(id: &str) -> RawDocument {
    RawDocument::new(
        format!("Post {}", id),
        format!("https://reddit.com/r/test/{}", id),
        body(id, 25),
    )
}

// ============================================================================
// Source Provider
// ============================================================================

/// Returns canned documents per keyword and records every query
#[derive(Default)]
pub struct FakeSource {
    results: HashMap<String, Vec<RawDocument>>,
    failing: Option<String>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keyword: &str, documents: Vec<RawDocument>) -> Self {
        self.results.insert(keyword.to_string(), documents);
        self
    }

    /// Queries for `keyword` fail with a network error
    pub fn failing_on(mut self, keyword: &str) -> Self {
        self.failing = Some(keyword.to_string());
        self
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceProvider for FakeSource {
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<RawDocument>, SourceError> {
        self.queries.lock().unwrap().push((keyword.to_string(), limit));
        if self.failing.as_deref() == Some(keyword) {
            return Err(SourceError::Network("connection refused".to_string()));
        }
        Ok(self
            .results
            .get(keyword)
            .map(|docs| docs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Scripted response for one call
pub enum Reply {
    Label(&'static str),
    RateLimited,
    Fail(&'static str),
}

impl Reply {
    fn into_result(self) -> Result<String, ClassifyError> {
        match self {
            Reply::Label(label) => Ok(label.to_string()),
            Reply::RateLimited => Err(ClassifyError::RateLimited { retry_after: None }),
            Reply::Fail(msg) => Err(ClassifyError::Service(msg.to_string())),
        }
    }
}

/// One recorded classifier call
#[derive(Debug, Clone)]
pub struct Call {
    pub at: tokio::time::Instant,
    pub system_prompt: String,
    pub user_prompt: String,
}

impl Call {
    pub fn is_for(&self, marker: &str) -> bool {
        self.system_prompt.contains(&format!("[{}]", marker))
    }
}

/// Answers per document marker from a script, otherwise with a default label
pub struct ScriptedClassifier {
    default_label: &'static str,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedClassifier {
    pub fn answering(default_label: &'static str) -> Self {
        Self {
            default_label,
            scripts: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies for the document tagged `[marker]`, in call order
    pub fn script(self, marker: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(format!("[{}]", marker), replies.into());
        self
    }

    /// Simulated service latency per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, marker: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.is_for(marker)).collect()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ClassifyError> {
        self.calls.lock().unwrap().push(Call {
            at: tokio::time::Instant::now(),
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts
                .iter_mut()
                .find(|(marker, _)| system_prompt.contains(marker.as_str()))
                .and_then(|(_, replies)| replies.pop_front())
        };

        match scripted {
            Some(reply) => reply.into_result(),
            None => Ok(self.default_label.to_string()),
        }
    }
}

// ============================================================================
// Language Detector
// ============================================================================

/// "en" unless the text carries a `[fr]` or `[undetectable]` tag
pub struct FixedDetector;

impl LanguageDetector for FixedDetector {
    fn detect(&self, text: &str) -> Result<String, DetectionFailed> {
        if text.contains("[undetectable]") {
            Err(DetectionFailed)
        } else if text.contains("[fr]") {
            Ok("fr".to_string())
        } else {
            Ok("en".to_string())
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Defaults with no waiting, for tests on the real clock
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        base_delay_secs: 0,
        batch_cooldown_secs: 0,
        ..Default::default()
    }
}

pub fn pipeline(
    source: Arc<FakeSource>,
    classifier: Arc<ScriptedClassifier>,
    config: PipelineConfig,
) -> Pipeline {
    Pipeline::new(source, classifier, Arc::new(FixedDetector), config)
}

pub fn app_state(source: Arc<FakeSource>, classifier: Arc<ScriptedClassifier>) -> AppState {
    AppState::new(pipeline(source, classifier, fast_config()))
}
