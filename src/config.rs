//! Configuration for comic-to-audio conversion.
//!
//! Every knob lives in [`NarrationConfig`], built through
//! [`NarrationConfigBuilder`]. Callers set what they care about and keep the
//! documented defaults for the rest.

use crate::error::NarrationError;
use crate::pipeline::speech::Prosody;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a comic-to-audio conversion.
///
/// # Example
/// ```rust
/// use comic_narrator::NarrationConfig;
///
/// let config = NarrationConfig::builder()
///     .dpi(300)
///     .concurrency(4)
///     .output_dir("out/audio")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct NarrationConfig {
    // ── Rendering ────────────────────────────────────────────────────────
    /// Rendering DPI. Range: 72–600. Default: 400.
    ///
    /// Comic lettering is small and hand-drawn; high DPI matters more here
    /// than for typeset documents.
    pub dpi: u32,

    /// Cap on the longest rendered edge, in pixels. Default: 6000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted comics.
    pub password: Option<String>,

    // ── Vision ───────────────────────────────────────────────────────────
    /// Pages extracted at once. Default: 1.
    pub concurrency: usize,

    /// Vision model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Default: 0.1.
    pub temperature: f32,

    /// Default: 1024.
    pub max_tokens: usize,

    /// Retries per vision call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Budget for one page's whole extraction, in seconds. Default: 180.
    pub api_timeout_secs: u64,

    pub caption_prompt: Option<String>,
    pub ocr_prompt: Option<String>,

    // ── OCR fallback ─────────────────────────────────────────────────────
    /// Primary OCR output shorter than this is insufficient. Default: 5.
    pub min_ocr_chars: usize,

    /// Longest edge passed to the fallback detector. Default: 1500.
    pub fallback_max_dimension: u32,

    /// Fallback regions at or below this confidence are dropped. Default: 0.25.
    pub min_region_confidence: f32,

    /// `tesseract` binary. Default: looked up on `PATH`.
    pub tesseract_path: Option<PathBuf>,

    /// Tesseract language code. Default: "eng".
    pub ocr_language: String,

    // ── Narration ────────────────────────────────────────────────────────
    /// Shorter sanitized narrations are rejected. Default: 10.
    pub min_narration_chars: usize,

    // ── Speech ───────────────────────────────────────────────────────────
    pub prosody: Prosody,

    /// Language for the basic fallback voice. Default: "en".
    pub speech_language: String,

    pub azure_speech_key: Option<String>,
    pub azure_speech_region: Option<String>,

    /// Timeout for each speech request, in seconds. Default: 120.
    pub speech_timeout_secs: u64,

    // ── Output ───────────────────────────────────────────────────────────
    /// Where artifacts are written. Default: `static/output`.
    pub output_dir: PathBuf,

    /// Public URL prefix for the audio artifact.
    pub public_url_prefix: Option<String>,

    /// Download timeout for URL inputs, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    pub progress_callback: Option<ProgressCallback>,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            dpi: 400,
            max_rendered_pixels: 6000,
            password: None,
            concurrency: 1,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 1024,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 180,
            caption_prompt: None,
            ocr_prompt: None,
            min_ocr_chars: 5,
            fallback_max_dimension: 1500,
            min_region_confidence: 0.25,
            tesseract_path: None,
            ocr_language: "eng".to_string(),
            min_narration_chars: 10,
            prosody: Prosody::default(),
            speech_language: "en".to_string(),
            azure_speech_key: None,
            azure_speech_region: None,
            speech_timeout_secs: 120,
            output_dir: PathBuf::from("static/output"),
            public_url_prefix: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for NarrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrationConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_retries", &self.max_retries)
            .field("min_ocr_chars", &self.min_ocr_chars)
            .field("min_region_confidence", &self.min_region_confidence)
            .field("min_narration_chars", &self.min_narration_chars)
            .field("prosody", &self.prosody)
            .field("azure_speech_key", &self.azure_speech_key.as_ref().map(|_| "<redacted>"))
            .field("azure_speech_region", &self.azure_speech_region)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl NarrationConfig {
    pub fn builder() -> NarrationConfigBuilder {
        NarrationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`NarrationConfig`].
#[derive(Debug)]
pub struct NarrationConfigBuilder {
    config: NarrationConfig,
}

impl NarrationConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn caption_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.caption_prompt = Some(prompt.into());
        self
    }

    pub fn ocr_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.ocr_prompt = Some(prompt.into());
        self
    }

    pub fn min_ocr_chars(mut self, n: usize) -> Self {
        self.config.min_ocr_chars = n;
        self
    }

    pub fn fallback_max_dimension(mut self, px: u32) -> Self {
        self.config.fallback_max_dimension = px;
        self
    }

    pub fn min_region_confidence(mut self, c: f32) -> Self {
        self.config.min_region_confidence = c;
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = Some(path.into());
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn min_narration_chars(mut self, n: usize) -> Self {
        self.config.min_narration_chars = n;
        self
    }

    pub fn prosody(mut self, rate: impl Into<String>, pitch: impl Into<String>) -> Self {
        self.config.prosody = Prosody {
            rate: rate.into(),
            pitch: pitch.into(),
        };
        self
    }

    pub fn speech_language(mut self, lang: impl Into<String>) -> Self {
        self.config.speech_language = lang.into();
        self
    }

    pub fn azure_speech(mut self, key: impl Into<String>, region: impl Into<String>) -> Self {
        self.config.azure_speech_key = Some(key.into());
        self.config.azure_speech_region = Some(region.into());
        self
    }

    pub fn speech_timeout_secs(mut self, secs: u64) -> Self {
        self.config.speech_timeout_secs = secs;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn public_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.public_url_prefix = Some(prefix.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<NarrationConfig, NarrationError> {
        let c = &self.config;
        let invalid = |msg: String| Err(NarrationError::InvalidConfig(msg));

        if !(72..=600).contains(&c.dpi) {
            return invalid(format!("DPI must be 72–600, got {}", c.dpi));
        }
        if c.concurrency == 0 {
            return invalid("Concurrency must be ≥ 1".into());
        }
        if !(0.0..=1.0).contains(&c.min_region_confidence) {
            return invalid(format!(
                "Region confidence threshold must be 0–1, got {}",
                c.min_region_confidence
            ));
        }
        if c.fallback_max_dimension < 16 {
            return invalid(format!(
                "Fallback OCR dimension must be ≥ 16 px, got {}",
                c.fallback_max_dimension
            ));
        }
        if c.api_timeout_secs == 0 {
            return invalid("Page timeout must be ≥ 1 second".into());
        }
        if c.output_dir.as_os_str().is_empty() {
            return invalid("Output directory must not be empty".into());
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = NarrationConfig::default();
        assert_eq!(c.dpi, 400);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.min_ocr_chars, 5);
        assert_eq!(c.fallback_max_dimension, 1500);
        assert_eq!(c.min_region_confidence, 0.25);
        assert_eq!(c.min_narration_chars, 10);
        assert_eq!(c.prosody.rate, "+0%");
        assert_eq!(c.output_dir, PathBuf::from("static/output"));
    }

    #[test]
    fn builder_sets_fields() {
        let c = NarrationConfig::builder()
            .dpi(300)
            .concurrency(4)
            .public_url_prefix("https://cdn.example.com")
            .azure_speech("k", "westus")
            .build()
            .unwrap();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.azure_speech_region.as_deref(), Some("westus"));
    }

    #[test]
    fn rejects_out_of_range_dpi() {
        let err = NarrationConfig::builder().dpi(20).build().unwrap_err();
        assert!(err.to_string().contains("DPI"));
        assert!(NarrationConfig::builder().dpi(601).build().is_err());
    }

    #[test]
    fn rejects_zero_concurrency() {
        assert!(NarrationConfig::builder().concurrency(0).build().is_err());
    }

    #[test]
    fn rejects_bad_confidence() {
        assert!(NarrationConfig::builder()
            .min_region_confidence(1.5)
            .build()
            .is_err());
    }

    #[test]
    fn debug_redacts_speech_key() {
        let c = NarrationConfig::builder()
            .azure_speech("super-secret", "westus")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
