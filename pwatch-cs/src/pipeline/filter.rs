//! Document filter
//!
//! Keeps a raw document iff its language matches, its trimmed body is
//! non-empty, the body is not just a link, and it has enough words. Accepted
//! bodies are hard-cut to the character budget.

use crate::services::LanguageDetector;
use crate::types::{Document, RawDocument};
use once_cell::sync::Lazy;
use regex::Regex;

/// Whole-text bare link: optional scheme, dotted host, optional path/query
static BARE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(https?://)?([a-zA-Z0-9-]+\.)+[a-zA-Z]{2,}(/[a-zA-Z0-9#-]+)*(\?[a-zA-Z0-9=&]+)?/?$",
    )
    .expect("bare link pattern is valid")
});

/// Filter thresholds for one run
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    /// Accepted language code
    pub language: String,
    /// Minimum whitespace-separated tokens in the body
    pub min_words: usize,
    /// Maximum body length in characters
    pub char_budget: usize,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            min_words: 20,
            char_budget: 16_000,
        }
    }
}

/// Why a document was not kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Undetected,
    WrongLanguage,
    Empty,
    BareLink,
    TooShort,
}

/// Per-run filter counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub accepted: usize,
    pub undetected: usize,
    pub wrong_language: usize,
    pub empty: usize,
    pub bare_link: usize,
    pub too_short: usize,
}

impl FilterStats {
    fn record(&mut self, verdict: &Result<Document, Rejection>) {
        match verdict {
            Ok(_) => self.accepted += 1,
            Err(Rejection::Undetected) => self.undetected += 1,
            Err(Rejection::WrongLanguage) => self.wrong_language += 1,
            Err(Rejection::Empty) => self.empty += 1,
            Err(Rejection::BareLink) => self.bare_link += 1,
            Err(Rejection::TooShort) => self.too_short += 1,
        }
    }
}

/// True when the whole text is a single link
pub fn is_bare_link(text: &str) -> bool {
    BARE_LINK.is_match(text)
}

/// First `budget` characters of `text` (no word-boundary handling)
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((byte_offset, _)) => &text[..byte_offset],
        None => text,
    }
}

/// Judge one raw document
pub fn evaluate(
    raw: &RawDocument,
    detector: &dyn LanguageDetector,
    settings: &FilterSettings,
) -> Result<Document, Rejection> {
    let language = detector
        .detect(&format!("{} {}", raw.title, raw.body))
        .map_err(|_| Rejection::Undetected)?;

    let body = raw.body.trim();
    if body.is_empty() {
        return Err(Rejection::Empty);
    }
    if is_bare_link(body) {
        return Err(Rejection::BareLink);
    }
    if body.split_whitespace().count() < settings.min_words {
        return Err(Rejection::TooShort);
    }
    if language != settings.language {
        return Err(Rejection::WrongLanguage);
    }

    Ok(Document {
        title: raw.title.clone(),
        url: raw.url.clone(),
        truncated_body: truncate_chars(body, settings.char_budget).to_string(),
    })
}

/// Filter a keyword's results, preserving order
pub fn filter_documents(
    raw_documents: Vec<RawDocument>,
    detector: &dyn LanguageDetector,
    settings: &FilterSettings,
    stats: &mut FilterStats,
) -> Vec<Document> {
    raw_documents
        .iter()
        .filter_map(|raw| {
            let verdict = evaluate(raw, detector, settings);
            stats.record(&verdict);
            match verdict {
                Ok(document) => Some(document),
                Err(Rejection::Undetected) => {
                    tracing::warn!(url = %raw.url, "Could not detect language, skipping document");
                    None
                }
                Err(reason) => {
                    tracing::trace!(url = %raw.url, reason = ?reason, "Document rejected");
                    None
                }
            }
        })
        .collect()
}
