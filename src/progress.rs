//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn NarrationProgressCallback>`] via
//! [`crate::config::NarrationConfigBuilder::progress_callback`] to receive
//! events as pages are extracted and the narration is voiced. The CLI uses
//! it to drive its progress bar.
//!
//! # Example
//!
//! ```rust
//! use comic_narrator::{NarrationConfig, NarrationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl NarrationProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} chars)", page_num, total_pages, text_len);
//!     }
//! }
//!
//! let config = NarrationConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::fallback::Tier;
use crate::voice::SpeakerRole;
use std::sync::Arc;

/// Called by the pipeline as it works through a comic.
///
/// With `concurrency > 1`, page events may arrive from several pages at once
/// and out of order. All methods default to no-ops.
pub trait NarrationProgressCallback: Send + Sync {
    /// Pages rendered; extraction is about to start.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// `text_len` is the byte length of the text the page contributes.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    /// The page yielded nothing usable; conversion continues.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Narration composed and classified; synthesis is about to start.
    fn on_narration_ready(&self, chars: usize, role: SpeakerRole) {
        let _ = (chars, role);
    }

    fn on_synthesis_complete(&self, engine: &str, tier: Tier) {
        let _ = (engine, tier);
    }

    /// Artifacts written.
    fn on_conversion_complete(&self, total_pages: usize, pages_with_text: usize) {
        let _ = (total_pages, pages_with_text);
    }
}

/// Used when no callback is configured.
pub struct NoopProgressCallback;

impl NarrationProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::NarrationConfig`].
pub type ProgressCallback = Arc<dyn NarrationProgressCallback>;
