//! Pipeline stages for comic-to-audio narration.
//!
//! Each submodule implements one transformation step so it can be tested on
//! its own and swapped behind its trait.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ extract ──▶ compose ──▶ speech ──▶ artifacts
//! (path/URL) (pdfium)  (caption,   (sanitize)  (voice,    (.txt + .mp3)
//!                       OCR tiers)              fallback)
//! ```
//!
//! 1. [`input`]     canonicalise the path or URL to a local PDF
//! 2. [`render`]    rasterise pages on the blocking pool
//! 3. [`encode`]    PNG / base64 for the engines
//! 4. [`vision`]    vision-LLM captioning and primary OCR, with retry
//! 5. [`tesseract`] local fallback OCR
//! 6. [`extract`]   per-page fusion of caption and OCR tiers
//! 7. [`sanitize`]  the ordered text-repair rule table
//! 8. [`compose`]   join pages into one narration
//! 9. [`speech`]    synthesis with engine fallback
//! 10. [`artifacts`] atomic persistence of text and audio

pub mod artifacts;
pub mod compose;
pub mod encode;
pub mod extract;
pub mod input;
pub mod render;
pub mod sanitize;
pub mod speech;
pub mod tesseract;
pub mod vision;
