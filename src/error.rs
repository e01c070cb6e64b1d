//! Error types for the comic-narrator library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`NarrationError`]: **fatal**. The conversion cannot produce a usable
//!   narration (unreadable PDF, narration too short, no speech engine worked).
//!   Returned as `Err(NarrationError)` from the top-level `convert*` functions.
//!
//! * [`PageError`]: **non-fatal**. A single page yielded nothing (caption and
//!   OCR both failed, or the vision call timed out). Stored inside
//!   [`crate::output::PageResult`]; the page contributes an empty fragment and
//!   the rest of the document carries on.
//!
//! Engine-level failures ([`VisionError`], [`SpeechError`]) never reach the
//! caller directly: the extractor absorbs vision errors into a `PageError`,
//! and the synthesizer folds speech errors into
//! [`NarrationError::SynthesisUnavailable`] once both engines have failed.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the comic-narrator library.
#[derive(Debug, Error)]
pub enum NarrationError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The PDF could not be opened: missing, unreadable, not a PDF, corrupt
    /// or encrypted without a password.
    #[error("PDF source '{path}' is unreadable: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Narration errors ──────────────────────────────────────────────────
    /// Sanitized narration is too short to be worth speaking.
    #[error("Narration too short after sanitization: {chars} chars (minimum {min})")]
    NarrationTooShort { chars: usize, min: usize },

    /// Both the primary and the fallback speech engine failed.
    #[error("No speech engine could synthesize the narration.\nPrimary: {primary}\nFallback: {fallback}")]
    SynthesisUnavailable { primary: String, fallback: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The vision provider is not initialised (missing API key etc.).
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Artifact errors ───────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write artifact '{path}': {source}")]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read a previously written artifact back.
    #[error("Failed to read artifact '{path}': {source}")]
    ArtifactReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Record store errors ───────────────────────────────────────────────
    /// The record store has no comic with this id.
    #[error("Comic record {id} not found")]
    RecordNotFound { id: i64 },

    /// The record store rejected a read or an update.
    #[error("Record store error: {0}")]
    RecordStore(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Install pdfium system-wide or set PDFIUM_LIB_PATH=/path/to/libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The page still appears in the output with an empty fragment.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Neither OCR nor captioning produced any text for the page.
    #[error("Page {page}: extraction degraded: {detail}")]
    ExtractionDegraded { page: usize, detail: String },

    /// The whole extraction for the page exceeded the per-page budget.
    #[error("Page {page}: extraction timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}

/// Failure of a captioning, OCR or text-detection engine.
#[derive(Debug, Clone, Error)]
pub enum VisionError {
    /// The vision LLM call failed after retries.
    #[error("{engine}: request failed after {retries} retries: {detail}")]
    Provider {
        engine: String,
        retries: u32,
        detail: String,
    },

    /// The page image could not be encoded or resized.
    #[error("image encoding failed: {0}")]
    Image(String),

    /// The engine is not installed or disabled.
    #[error("{0} is unavailable")]
    Unavailable(String),

    /// A local OCR process failed.
    #[error("{engine} failed: {detail}")]
    Detector { engine: String, detail: String },
}

/// Failure of a text-to-speech engine.
#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    /// Credentials or endpoint missing.
    #[error("{0} is not configured")]
    NotConfigured(String),

    /// Transport-level failure.
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The service answered successfully but produced no audio.
    #[error("engine returned no audio")]
    EmptyAudio,
}
