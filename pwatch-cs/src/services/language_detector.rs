//! Language detection for filtering
//!
//! Trigram-based detection via `whatlang`. Codes are reported as ISO 639-1 for
//! the languages commonly seen in search results and as ISO 639-3 otherwise.

use super::{DetectionFailed, LanguageDetector};

/// ISO 639-3 → ISO 639-1 for the common languages
const ISO_639_1: &[(&str, &str)] = &[
    ("eng", "en"),
    ("fra", "fr"),
    ("deu", "de"),
    ("spa", "es"),
    ("por", "pt"),
    ("ita", "it"),
    ("nld", "nl"),
    ("rus", "ru"),
    ("ukr", "uk"),
    ("pol", "pl"),
    ("ces", "cs"),
    ("swe", "sv"),
    ("dan", "da"),
    ("nob", "no"),
    ("fin", "fi"),
    ("tur", "tr"),
    ("ron", "ro"),
    ("hun", "hu"),
    ("ell", "el"),
    ("ara", "ar"),
    ("heb", "he"),
    ("hin", "hi"),
    ("jpn", "ja"),
    ("kor", "ko"),
    ("cmn", "zh"),
    ("vie", "vi"),
    ("ind", "id"),
];

/// Default detector backed by `whatlang`
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangDetector;

impl WhatlangDetector {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<String, DetectionFailed> {
        let info = whatlang::detect(text).ok_or(DetectionFailed)?;
        Ok(to_iso_639_1(info.lang().code()).to_string())
    }
}

/// Map an ISO 639-3 code to ISO 639-1, passing unknown codes through
pub fn to_iso_639_1(code: &str) -> &str {
    ISO_639_1
        .iter()
        .find(|(three, _)| *three == code)
        .map(|(_, two)| *two)
        .unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_english_text() {
        let text = "The new model was released last week and people are already \
                    discussing whether it can be trusted with important decisions.";
        assert_eq!(WhatlangDetector::new().detect(text).unwrap(), "en");
    }

    #[test]
    fn detects_french_text() {
        let text = "Le nouveau modèle a été publié la semaine dernière et les gens \
                    se demandent déjà s'il peut prendre des décisions importantes.";
        assert_eq!(WhatlangDetector::new().detect(text).unwrap(), "fr");
    }

    #[test]
    fn empty_text_fails() {
        assert_eq!(WhatlangDetector::new().detect(""), Err(DetectionFailed));
    }

    #[test]
    fn unknown_codes_pass_through() {
        assert_eq!(to_iso_639_1("eng"), "en");
        assert_eq!(to_iso_639_1("epo"), "epo");
    }
}
