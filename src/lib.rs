//! # comic-narrator
//!
//! Turn scanned comic-book PDFs into narrated audio.
//!
//! Comic pages are mostly pictures with a little hand-lettered text, which
//! defeats plain text extraction. This crate rasterises every page, asks a
//! vision model to caption the artwork and read the speech bubbles, falls
//! back to local Tesseract OCR when the model returns nothing, cleans the OCR
//! text up, picks a voice from who the story seems to be about, and speaks
//! the result with a neural TTS service (or a basic one when that fails).
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Extract    caption + OCR per page, Tesseract fallback
//!  ├─ 4. Compose    page order, label stripping, staged OCR sanitizer
//!  ├─ 5. Classify   keyword heuristic → speaker role → voice
//!  ├─ 6. Speak      neural TTS, basic TTS fallback
//!  └─ 7. Persist    <name>_cleaned.txt + <name>.mp3
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use comic_narrator::{convert, NarrationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Vision provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = NarrationConfig::builder()
//!         .azure_speech("my-key", "eastus")
//!         .output_dir("static/output")
//!         .build()?;
//!     let output = convert("mouse_tale.pdf", &config).await?;
//!     println!("{} ({})", output.audio_path.display(), output.role);
//!     Ok(())
//! }
//! ```
//!
//! For a long-running service, build a [`Narrator`] once and reuse it:
//! engines, HTTP clients and the OCR readiness probe are shared across
//! conversions.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `comic2audio` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod fallback;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod records;
pub mod voice;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{NarrationConfig, NarrationConfigBuilder};
pub use convert::{convert, convert_from_bytes, convert_sync, Narrator, NarratorBuilder};
pub use error::{NarrationError, PageError, SpeechError, VisionError};
pub use fallback::Tier;
pub use output::{ConversionOutput, ConversionStats, PageResult};
pub use pipeline::sanitize::{clean_text, sanitize};
pub use progress::{NarrationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use records::{strip_voice_tags, ComicRecord, ConversionUpdate, RecordStore};
pub use voice::{classify, voice_for, SpeakerRole, VoiceProfile};
