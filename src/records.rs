//! The seam to the host application's comic records.
//!
//! The host (a web app, a job runner) owns the table of uploaded comics; the
//! library only needs to look one up and record the result. [`RecordStore`]
//! is that interface, and [`crate::convert::Narrator::convert_record`] drives
//! it: fetch, convert, then update. A failed conversion never updates the
//! record.

use crate::error::NarrationError;
use crate::voice::speaker_tag_alternation;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A stored comic awaiting (or re-awaiting) conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComicRecord {
    pub id: i64,
    /// Path or URL of the uploaded PDF.
    pub file_path: String,
}

/// What a successful conversion writes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionUpdate {
    /// Public URL of the audio when one is configured, else its path.
    pub audio_path: String,
    pub text_path: PathBuf,
    /// Narration for display, with voice tags removed.
    pub caption_text: String,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch(&self, id: i64) -> Result<Option<ComicRecord>, NarrationError>;
    async fn complete(&self, id: i64, update: ConversionUpdate) -> Result<(), NarrationError>;
}

static RE_VOICE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\[\s*(?:{})\s*\]\s*",
        speaker_tag_alternation()
    ))
    .unwrap()
});

/// Remove bracketed voice tags such as `[NARRATOR]` from text shown to users.
pub fn strip_voice_tags(caption: &str) -> String {
    RE_VOICE_TAG.replace_all(caption, "").trim().to_string()
}
