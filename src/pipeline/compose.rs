//! Narration composition: page results → one sanitized narration.
//!
//! Pages are joined strictly in page order. Label prefixes that vision models
//! like to emit (`Image Caption:`, `OCR Text:` …) are stripped first, then
//! the joined text goes through [`sanitize`] once as a whole so rules that
//! look across sentence boundaries see the real boundaries.

use crate::error::NarrationError;
use crate::pipeline::extract::ExtractionResult;
use crate::pipeline::sanitize::sanitize;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

static RE_LABELS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:Image Caption|OCR Text|Image Description|Scene|Text|Caption|Description)\s*:",
    )
    .unwrap()
});

/// Sanitized text of one page, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrationFragment {
    /// 1-based page number.
    pub page_num: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Narration {
    pub text: String,
    pub fragments: Vec<NarrationFragment>,
}

impl Narration {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Remove caption/OCR label prefixes anywhere in the text. Labels match
/// only in their capitalised form, so `the scene:` in prose survives.
pub fn strip_labels(text: &str) -> String {
    RE_LABELS.replace_all(text, " ").trim().to_string()
}

pub struct NarrationComposer {
    min_chars: usize,
}

impl NarrationComposer {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    /// Compose pages given as `(0-based index, result)` in any order.
    pub fn compose(
        &self,
        mut pages: Vec<(usize, ExtractionResult)>,
    ) -> Result<Narration, NarrationError> {
        pages.sort_by_key(|(index, _)| *index);

        let mut raw_parts: Vec<String> = Vec::with_capacity(pages.len());
        let mut fragments = Vec::with_capacity(pages.len());

        for (index, result) in &pages {
            let raw = strip_labels(result.narration_text());
            fragments.push(NarrationFragment {
                page_num: index + 1,
                text: sanitize(&raw),
            });
            if !raw.is_empty() {
                raw_parts.push(raw);
            }
        }

        let text = sanitize(&raw_parts.join(" "));
        let chars = text.chars().count();
        debug!(
            "Composed {} non-empty fragments from {} pages → {} chars",
            raw_parts.len(),
            pages.len(),
            chars
        );

        if chars < self.min_chars {
            return Err(NarrationError::NarrationTooShort {
                chars,
                min: self.min_chars,
            });
        }

        info!("Narration ready: {} chars", chars);
        Ok(Narration { text, fragments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::OcrSource;

    fn ocr(text: &str) -> ExtractionResult {
        ExtractionResult {
            caption: String::new(),
            ocr_text: text.to_string(),
            source: OcrSource::Primary,
        }
    }

    fn caption(text: &str) -> ExtractionResult {
        ExtractionResult {
            caption: text.to_string(),
            ocr_text: String::new(),
            source: OcrSource::None,
        }
    }

    #[test]
    fn joins_in_page_order() {
        let composer = NarrationComposer::new(10);
        let n = composer
            .compose(vec![
                (1, caption("A king sits on a throne.")),
                (0, ocr("Once upon a time there was a King.")),
            ])
            .unwrap();
        assert_eq!(
            n.text,
            "Once upon a time there was a King. A king sits on a throne."
        );
        assert_eq!(n.fragments[0].page_num, 1);
        assert_eq!(n.fragments[1].text, "A king sits on a throne.");
    }

    #[test]
    fn strips_labels_anywhere() {
        let stripped = strip_labels("Image Caption: A mouse. OCR Text: Hello there");
        assert_eq!(
            stripped.split_whitespace().collect::<Vec<_>>().join(" "),
            "A mouse. Hello there"
        );
        let composer = NarrationComposer::new(10);
        let n = composer
            .compose(vec![(0, caption("Scene: The queen smiles at the crowd."))])
            .unwrap();
        assert_eq!(n.text, "The queen smiles at the crowd.");
    }

    #[test]
    fn lowercase_label_words_in_prose_are_kept() {
        for prose in [
            "He described the scene: a dark forest.",
            "She read the text: it said to run.",
            "The caption: Lost Mouse.",
            "Their description: tall and grey.",
        ] {
            assert_eq!(strip_labels(prose), prose);
        }
        let composer = NarrationComposer::new(10);
        let n = composer
            .compose(vec![(0, ocr("He described the scene: a dark forest."))])
            .unwrap();
        assert!(n.text.contains("scene:"), "got {:?}", n.text);
    }

    #[test]
    fn empty_pages_are_skipped_in_join() {
        let composer = NarrationComposer::new(10);
        let n = composer
            .compose(vec![
                (0, ExtractionResult::default()),
                (1, ocr("The mouse ran home.")),
            ])
            .unwrap();
        assert_eq!(n.text, "The mouse ran home.");
        assert_eq!(n.fragments.len(), 2);
        assert_eq!(n.fragments[0].text, "");
    }

    #[test]
    fn too_short_is_an_error() {
        let composer = NarrationComposer::new(10);
        let err = composer
            .compose(vec![(0, ExtractionResult::default()), (1, ocr("Hi"))])
            .unwrap_err();
        assert!(matches!(
            err,
            NarrationError::NarrationTooShort { chars: 2, min: 10 }
        ));
    }

    #[test]
    fn no_pages_is_too_short() {
        let err = NarrationComposer::new(10).compose(Vec::new()).unwrap_err();
        assert!(matches!(err, NarrationError::NarrationTooShort { chars: 0, .. }));
    }

    #[test]
    fn word_and_char_counts() {
        let n = NarrationComposer::new(1)
            .compose(vec![(0, ocr("The mouse ran home."))])
            .unwrap();
        assert_eq!(n.word_count(), 4);
        assert_eq!(n.char_count(), 19);
    }
}
