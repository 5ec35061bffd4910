//! Classification submitter
//!
//! Classifies documents one at a time, batch by batch, and pushes each outcome
//! to the emitter as soon as it is known. Throttled calls are retried per
//! document with exponential backoff; a cooldown separates batches.
//!
//! Cancellation is checked before every call and interrupts backoff/cooldown
//! sleeps. A call already in flight is allowed to finish and its result is
//! discarded.

use super::retry::{RetryDecision, RetryPolicy, RetryState};
use super::PipelineError;
use crate::services::{ClassifyError, Classifier};
use crate::types::{Batch, ClassificationOutcome, Document, RunReport};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Build the system prompt embedding the document body
pub fn system_prompt(body: &str) -> String {
    format!(
        "Post text: {body}\n\n\
         You are an AI assistant that evaluates text content. Your task is to determine if the given text discusses \
         any aspect of AI that might be dangerous or have a negative impact on humanity in the future.\n\
         Respond with only \"Yes\" if the content is potentially dangerous or harmful, otherwise respond with \"No\"."
    )
}

/// How a submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Every document was attempted
    Completed(RunReport),
    /// Stopped early; the report covers what was delivered before cancellation
    Cancelled(RunReport),
}

enum DocumentResult {
    Classified(ClassificationOutcome),
    Dropped,
    Cancelled,
}

/// Drives classification for one run
pub struct Submitter<'a> {
    classifier: &'a dyn Classifier,
    policy: RetryPolicy,
    cooldown: Duration,
    affirmative_label: &'a str,
}

impl<'a> Submitter<'a> {
    pub fn new(
        classifier: &'a dyn Classifier,
        policy: RetryPolicy,
        cooldown: Duration,
        affirmative_label: &'a str,
    ) -> Self {
        Self {
            classifier,
            policy,
            cooldown,
            affirmative_label,
        }
    }

    /// Classify every document, sending outcomes in submission order
    ///
    /// A closed outcome channel is treated as cancellation.
    pub async fn submit(
        &self,
        batches: Vec<Batch>,
        instruction: &str,
        outcomes: &mpsc::Sender<ClassificationOutcome>,
        token: &CancellationToken,
    ) -> Result<SubmitStatus, PipelineError> {
        let mut report = RunReport {
            documents: batches.iter().map(Vec::len).sum(),
            ..Default::default()
        };
        let batch_count = batches.len();
        let mut index = 0;

        for (batch_no, batch) in batches.into_iter().enumerate() {
            tracing::debug!(batch = batch_no + 1, of = batch_count, size = batch.len(), "Starting batch");

            for document in batch {
                index += 1;

                match self.classify_document(index, document, instruction, token).await? {
                    DocumentResult::Classified(outcome) => {
                        let url = outcome.url.clone();
                        let label = outcome.label;
                        if !deliver(outcomes, outcome, token).await {
                            return Ok(SubmitStatus::Cancelled(report));
                        }
                        report.classified += 1;
                        if label {
                            report.matched.push(url);
                        }
                    }
                    DocumentResult::Dropped => report.dropped += 1,
                    DocumentResult::Cancelled => return Ok(SubmitStatus::Cancelled(report)),
                }
            }

            if batch_no + 1 < batch_count {
                tracing::debug!(cooldown = ?self.cooldown, "Batch completed, waiting before next batch");
                if !pause(self.cooldown, token).await {
                    return Ok(SubmitStatus::Cancelled(report));
                }
            }
        }

        Ok(SubmitStatus::Completed(report))
    }

    async fn classify_document(
        &self,
        index: usize,
        document: Document,
        instruction: &str,
        token: &CancellationToken,
    ) -> Result<DocumentResult, PipelineError> {
        let prompt = system_prompt(&document.truncated_body);
        let mut state = RetryState::new();

        loop {
            if token.is_cancelled() {
                return Ok(DocumentResult::Cancelled);
            }

            tracing::debug!(index = index, attempt = state.attempts_made(), "Classifying document");
            let result = self.classifier.classify(&prompt, instruction).await;

            if token.is_cancelled() {
                tracing::debug!(index = index, "Discarding result of call completed after cancellation");
                return Ok(DocumentResult::Cancelled);
            }

            match result {
                Ok(response) => {
                    return Ok(DocumentResult::Classified(ClassificationOutcome {
                        index,
                        title: document.title,
                        url: document.url,
                        label: response == self.affirmative_label,
                        attempts: state.attempts_made(),
                    }));
                }
                Err(ClassifyError::RateLimited { retry_after }) => match state.on_rate_limited(&self.policy) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::warn!(
                            index = index,
                            attempt = state.failed_attempts(),
                            delay = ?delay,
                            retry_after = ?retry_after,
                            "Rate limit exceeded, waiting before retrying"
                        );
                        if !pause(delay, token).await {
                            return Ok(DocumentResult::Cancelled);
                        }
                    }
                    RetryDecision::Exhausted => {
                        tracing::warn!(
                            index = index,
                            url = %document.url,
                            attempts = state.failed_attempts(),
                            "Rate limit retries exhausted, dropping document"
                        );
                        return Ok(DocumentResult::Dropped);
                    }
                },
                Err(source) => return Err(PipelineError::Classifier { index, source }),
            }
        }
    }
}

/// Sleep unless cancelled first; returns false on cancellation
async fn pause(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Hand an outcome to the emitter; returns false when the run must stop
async fn deliver(
    outcomes: &mpsc::Sender<ClassificationOutcome>,
    outcome: ClassificationOutcome,
    token: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = outcomes.send(outcome) => {
            if sent.is_err() {
                // Emitter gone: the client will never read further outcomes
                token.cancel();
            }
            sent.is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses, then answers "No"
    struct ScriptedClassifier {
        script: Mutex<VecDeque<Result<String, ClassifyError>>>,
        calls: Mutex<Vec<tokio::time::Instant>>,
    }

    impl ScriptedClassifier {
        fn new(script: Vec<Result<String, ClassifyError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<tokio::time::Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Classifier for ScriptedClassifier {
        async fn classify(&self, _system: &str, _user: &str) -> Result<String, ClassifyError> {
            self.calls.lock().unwrap().push(tokio::time::Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("No".to_string()))
        }
    }

    fn rate_limited() -> Result<String, ClassifyError> {
        Err(ClassifyError::RateLimited { retry_after: None })
    }

    fn doc(i: usize) -> Document {
        Document {
            title: format!("title {}", i),
            url: format!("https://reddit.com/{}", i),
            truncated_body: format!("body {}", i),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(20),
        }
    }

    async fn collect(mut rx: mpsc::Receiver<ClassificationOutcome>) -> Vec<ClassificationOutcome> {
        let mut outcomes = Vec::new();
        while let Some(o) = rx.recv().await {
            outcomes.push(o);
        }
        outcomes
    }

    #[test]
    fn test_system_prompt_embeds_body() {
        let prompt = system_prompt("the post body");
        assert!(prompt.starts_with("Post text: the post body"));
        assert!(prompt.contains("\"Yes\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_offsets() {
        let classifier = ScriptedClassifier::new(vec![rate_limited(), rate_limited(), Ok("Yes".into())]);
        let submitter = Submitter::new(&classifier, policy(), Duration::from_secs(20), "Yes");
        let (tx, rx) = mpsc::channel(8);
        let token = CancellationToken::new();

        let status = submitter.submit(vec![vec![doc(1)]], "classify", &tx, &token).await.unwrap();
        drop(tx);
        let outcomes = collect(rx).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].attempts, 3);
        assert!(outcomes[0].label);

        let calls = classifier.call_times();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_secs(40));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(80));

        match status {
            SubmitStatus::Completed(report) => {
                assert_eq!(report.matched, vec!["https://reddit.com/1".to_string()]);
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_document_dropped_and_batch_continues() {
        let classifier = ScriptedClassifier::new(vec![
            rate_limited(),
            rate_limited(),
            rate_limited(),
            Ok("No".into()),
        ]);
        let submitter = Submitter::new(&classifier, policy(), Duration::from_secs(20), "Yes");
        let (tx, rx) = mpsc::channel(8);
        let token = CancellationToken::new();

        let status = submitter
            .submit(vec![vec![doc(1), doc(2)]], "classify", &tx, &token)
            .await
            .unwrap();
        drop(tx);
        let outcomes = collect(rx).await;

        assert_eq!(classifier.call_times().len(), 4);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].index, 2);
        assert_eq!(outcomes[0].attempts, 1);
        assert!(matches!(status, SubmitStatus::Completed(ref r) if r.dropped == 1 && r.classified == 1));
    }

    #[tokio::test]
    async fn test_service_error_terminates() {
        let classifier = ScriptedClassifier::new(vec![
            Ok("No".into()),
            Err(ClassifyError::Service("boom".into())),
        ]);
        let submitter = Submitter::new(&classifier, policy(), Duration::ZERO, "Yes");
        let (tx, _rx) = mpsc::channel(8);
        let token = CancellationToken::new();

        let err = submitter
            .submit(vec![vec![doc(1), doc(2), doc(3)]], "classify", &tx, &token)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Classifier { index: 2, .. }));
        assert_eq!(classifier.call_times().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_between_batches_only() {
        let classifier = ScriptedClassifier::new(Vec::new());
        let submitter = Submitter::new(&classifier, policy(), Duration::from_secs(20), "Yes");
        let (tx, _rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();

        submitter
            .submit(vec![vec![doc(1), doc(2)], vec![doc(3)]], "classify", &tx, &token)
            .await
            .unwrap();

        let calls = classifier.call_times();
        assert_eq!(calls[1] - calls[0], Duration::ZERO);
        assert_eq!(calls[2] - calls[1], Duration::from_secs(20));
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_literal_affirmative_match() {
        let classifier = ScriptedClassifier::new(vec![
            Ok("Yes".into()),
            Ok("yes".into()),
            Ok("Yes.".into()),
        ]);
        let submitter = Submitter::new(&classifier, policy(), Duration::ZERO, "Yes");
        let (tx, rx) = mpsc::channel(8);
        let token = CancellationToken::new();

        submitter
            .submit(vec![vec![doc(1), doc(2), doc(3)]], "classify", &tx, &token)
            .await
            .unwrap();
        drop(tx);

        let labels: Vec<bool> = collect(rx).await.iter().map(|o| o.label).collect();
        assert_eq!(labels, vec![true, false, false]);
    }

    #[tokio::test]
    async fn test_closed_channel_cancels() {
        let classifier = ScriptedClassifier::new(Vec::new());
        let submitter = Submitter::new(&classifier, policy(), Duration::ZERO, "Yes");
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let token = CancellationToken::new();

        let status = submitter
            .submit(vec![vec![doc(1), doc(2)]], "classify", &tx, &token)
            .await
            .unwrap();

        assert!(matches!(status, SubmitStatus::Cancelled(_)));
        assert!(token.is_cancelled());
        assert_eq!(classifier.call_times().len(), 1);
    }
}
