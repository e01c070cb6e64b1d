//! Output types returned by a conversion.

use crate::error::PageError;
use crate::fallback::Tier;
use crate::pipeline::compose::NarrationFragment;
use crate::pipeline::extract::{ExtractionResult, OcrSource};
use crate::voice::SpeakerRole;
use serde::Serialize;
use std::path::PathBuf;

/// Average narration pace used for the duration estimate.
pub const WORDS_PER_MINUTE: f64 = 150.0;

/// Result of converting one comic.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    pub audio_path: PathBuf,
    pub audio_url: Option<String>,
    pub text_path: PathBuf,
    /// The narration as read back from the text artifact.
    pub cleaned_text: String,
    pub role: SpeakerRole,
    pub voice_id: String,
    pub speech_tier: Tier,
    pub speech_engine: String,
    pub pages: Vec<PageResult>,
    pub fragments: Vec<NarrationFragment>,
    pub stats: ConversionStats,
}

/// What one page contributed.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    /// 1-based.
    pub page_num: usize,
    pub extraction: ExtractionResult,
    /// Selected text before sanitization.
    pub text: String,
    pub duration_ms: u64,
    pub error: Option<PageError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub ocr_primary_pages: usize,
    pub ocr_fallback_pages: usize,
    /// Pages whose text came from the caption alone.
    pub caption_only_pages: usize,
    pub degraded_pages: usize,
    pub narration_chars: usize,
    pub narration_words: usize,
    pub estimated_minutes: f64,
    pub render_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub synthesis_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ConversionStats {
    /// Page counts from the per-page results.
    pub fn tally(pages: &[PageResult]) -> Self {
        let mut stats = Self {
            total_pages: pages.len(),
            ..Default::default()
        };
        for page in pages {
            match page.extraction.source {
                OcrSource::Primary => stats.ocr_primary_pages += 1,
                OcrSource::Fallback => stats.ocr_fallback_pages += 1,
                OcrSource::None if !page.extraction.caption.trim().is_empty() => {
                    stats.caption_only_pages += 1
                }
                OcrSource::None => {}
            }
            if page.error.is_some() {
                stats.degraded_pages += 1;
            }
        }
        stats
    }

    pub fn set_narration(&mut self, chars: usize, words: usize) {
        self.narration_chars = chars;
        self.narration_words = words;
        self.estimated_minutes = words as f64 / WORDS_PER_MINUTE;
    }
}
