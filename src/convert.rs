//! Conversion entry points and the [`Narrator`] service.
//!
//! A [`Narrator`] owns every engine the pipeline needs. Build it once at
//! start-up (engines are reused across comics) and pass it to whatever
//! triggers conversions. The free functions [`convert`], [`convert_sync`]
//! and [`convert_from_bytes`] build a throwaway narrator from a config for
//! one-off use.

use crate::config::NarrationConfig;
use crate::error::{NarrationError, PageError};
use crate::output::{ConversionOutput, ConversionStats, PageResult};
use crate::pipeline::artifacts::ArtifactStore;
use crate::pipeline::compose::NarrationComposer;
use crate::pipeline::extract::{ExtractionResult, ExtractionSettings, VisionExtractor};
use crate::pipeline::input::{self, artifact_base_name};
use crate::pipeline::render::{Page, PdfiumRasterizer, Rasterizer};
use crate::pipeline::speech::{
    BasicSpeechEngine, NeuralSpeechEngine, SpeechEngine, SpeechSynthesizer,
};
use crate::pipeline::tesseract::{TesseractDetector, TextDetector};
use crate::pipeline::vision::{Captioner, LlmCaptioner, LlmOcr, OcrEngine, VisionSettings};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::records::{strip_voice_tags, ConversionUpdate, RecordStore};
use crate::voice::classify;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// The comic-to-audio service.
pub struct Narrator {
    config: NarrationConfig,
    rasterizer: Arc<dyn Rasterizer>,
    extractor: VisionExtractor,
    composer: NarrationComposer,
    synthesizer: SpeechSynthesizer,
    store: ArtifactStore,
    progress: ProgressCallback,
}

impl Narrator {
    /// Build a narrator with the default engines for `config`.
    pub fn from_config(config: NarrationConfig) -> Result<Self, NarrationError> {
        NarratorBuilder::new(config).build()
    }

    /// Start a builder to replace individual engines.
    pub fn builder(config: NarrationConfig) -> NarratorBuilder {
        NarratorBuilder::new(config)
    }

    pub fn config(&self) -> &NarrationConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.store
    }

    /// Whether the fallback OCR tier is usable.
    pub fn fallback_ocr_ready(&self) -> bool {
        self.extractor.fallback_ready()
    }

    /// Convert a PDF path or URL. Artifacts are named after its file stem.
    pub async fn convert(&self, input_str: &str) -> Result<ConversionOutput, NarrationError> {
        info!("Starting conversion: {}", input_str);
        let resolved = input::resolve_input(input_str, self.config.download_timeout_secs).await?;
        let base = artifact_base_name(input_str);
        self.convert_path(resolved.path(), &base).await
    }

    /// Convert in-memory PDF bytes. `name` supplies the artifact base name.
    pub async fn convert_from_bytes(
        &self,
        bytes: &[u8],
        name: &str,
    ) -> Result<ConversionOutput, NarrationError> {
        let mut tmp = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| NarrationError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| NarrationError::Internal(format!("tempfile write: {e}")))?;

        let path = tmp.path().to_string_lossy().to_string();
        let resolved = input::resolve_input(&path, self.config.download_timeout_secs).await?;
        // `tmp` is deleted when this function returns.
        self.convert_path(resolved.path(), &artifact_base_name(name))
            .await
    }

    /// Convert the comic behind record `id` and write the result back.
    /// The record is left untouched when conversion fails.
    pub async fn convert_record(
        &self,
        records: &dyn RecordStore,
        id: i64,
    ) -> Result<ConversionOutput, NarrationError> {
        let record = records
            .fetch(id)
            .await?
            .ok_or(NarrationError::RecordNotFound { id })?;

        let output = self.convert(&record.file_path).await?;

        let update = ConversionUpdate {
            audio_path: output
                .audio_url
                .clone()
                .unwrap_or_else(|| output.audio_path.display().to_string()),
            text_path: output.text_path.clone(),
            caption_text: strip_voice_tags(&output.cleaned_text),
        };
        records.complete(id, update).await?;
        info!("Comic record {} updated", id);
        Ok(output)
    }

    async fn convert_path(
        &self,
        pdf_path: &Path,
        base: &str,
    ) -> Result<ConversionOutput, NarrationError> {
        let total_start = Instant::now();

        // ── Step 1: Rasterise ────────────────────────────────────────────
        let render_start = Instant::now();
        let pages = self.rasterizer.rasterize(pdf_path, self.config.dpi).await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;
        let total_pages = pages.len();
        info!("Rendered {} pages in {}ms", total_pages, render_duration_ms);
        self.progress.on_conversion_start(total_pages);

        // ── Step 2: Extract (order-preserving) ───────────────────────────
        let extract_start = Instant::now();
        let page_results: Vec<PageResult> = stream::iter(pages)
            .map(|page| self.extract_page(page, total_pages))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;
        let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

        // ── Step 3: Compose ──────────────────────────────────────────────
        let narration = self.composer.compose(
            page_results
                .iter()
                .map(|p| (p.page_num - 1, p.extraction.clone()))
                .collect(),
        )?;

        // ── Step 4: Classify ─────────────────────────────────────────────
        let role = classify(&narration.text);
        info!("Speaker role: {}", role);
        self.progress
            .on_narration_ready(narration.char_count(), role);

        // ── Step 5: Synthesise + persist ─────────────────────────────────
        let synth_start = Instant::now();
        let synthesis = self
            .synthesizer
            .synthesize(&narration.text, role, base, &self.store)
            .await?;
        let synthesis_duration_ms = synth_start.elapsed().as_millis() as u64;
        self.progress
            .on_synthesis_complete(&synthesis.audio.engine, synthesis.audio.tier);

        // ── Step 6: Read the narration back for display ──────────────────
        let cleaned_text = self.store.read_narration(base).await?;

        let mut stats = ConversionStats::tally(&page_results);
        stats.set_narration(narration.char_count(), narration.word_count());
        stats.render_duration_ms = render_duration_ms;
        stats.extract_duration_ms = extract_duration_ms;
        stats.synthesis_duration_ms = synthesis_duration_ms;
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        let with_text = page_results.iter().filter(|p| !p.text.is_empty()).count();
        self.progress.on_conversion_complete(total_pages, with_text);
        info!(
            "Conversion complete: {}/{} pages with text, {:.1} min of audio, {}ms total",
            with_text, total_pages, stats.estimated_minutes, stats.total_duration_ms
        );

        Ok(ConversionOutput {
            audio_path: synthesis.artifacts.audio_path,
            audio_url: synthesis.artifacts.audio_url,
            text_path: synthesis.artifacts.text_path,
            cleaned_text,
            role,
            voice_id: synthesis.audio.voice.voice_id.to_string(),
            speech_tier: synthesis.audio.tier,
            speech_engine: synthesis.audio.engine,
            pages: page_results,
            fragments: narration.fragments,
            stats,
        })
    }

    async fn extract_page(&self, page: Page, total_pages: usize) -> PageResult {
        let page_num = page.number();
        let secs = self.config.api_timeout_secs;
        self.progress.on_page_start(page_num, total_pages);
        let start = Instant::now();

        let (extraction, error) =
            match tokio::time::timeout(Duration::from_secs(secs), self.extractor.extract(page)).await
            {
                Ok(out) => out,
                Err(_) => {
                    warn!("Page {}: extraction timed out after {}s", page_num, secs);
                    (
                        ExtractionResult::default(),
                        Some(PageError::Timeout {
                            page: page_num,
                            secs,
                        }),
                    )
                }
            };

        let text = extraction.narration_text().to_string();
        match &error {
            None => self.progress.on_page_complete(page_num, total_pages, text.len()),
            Some(e) => self.progress.on_page_error(page_num, total_pages, &e.to_string()),
        }
        debug!("Page {}: {} chars of text", page_num, text.len());

        PageResult {
            page_num,
            extraction,
            text,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
        }
    }
}

/// Assembles a [`Narrator`], defaulting any engine not supplied.
pub struct NarratorBuilder {
    config: NarrationConfig,
    rasterizer: Option<Arc<dyn Rasterizer>>,
    captioner: Option<Arc<dyn Captioner>>,
    ocr: Option<Arc<dyn OcrEngine>>,
    detector: Option<Option<Arc<dyn TextDetector>>>,
    primary_speech: Option<Arc<dyn SpeechEngine>>,
    fallback_speech: Option<Arc<dyn SpeechEngine>>,
}

impl NarratorBuilder {
    fn new(config: NarrationConfig) -> Self {
        Self {
            config,
            rasterizer: None,
            captioner: None,
            ocr: None,
            detector: None,
            primary_speech: None,
            fallback_speech: None,
        }
    }

    pub fn rasterizer(mut self, r: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = Some(r);
        self
    }

    pub fn captioner(mut self, c: Arc<dyn Captioner>) -> Self {
        self.captioner = Some(c);
        self
    }

    pub fn ocr_engine(mut self, o: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(o);
        self
    }

    /// Replace the fallback text detector; `None` disables the fallback tier.
    pub fn text_detector(mut self, d: Option<Arc<dyn TextDetector>>) -> Self {
        self.detector = Some(d);
        self
    }

    pub fn primary_speech(mut self, e: Arc<dyn SpeechEngine>) -> Self {
        self.primary_speech = Some(e);
        self
    }

    pub fn fallback_speech(mut self, e: Arc<dyn SpeechEngine>) -> Self {
        self.fallback_speech = Some(e);
        self
    }

    pub fn build(self) -> Result<Narrator, NarrationError> {
        let config = self.config;

        let (captioner, ocr) = match (self.captioner, self.ocr) {
            (Some(c), Some(o)) => (c, o),
            (c, o) => {
                let provider = resolve_provider(&config)?;
                let settings = VisionSettings::from_config(&config);
                let c = c.unwrap_or_else(|| {
                    Arc::new(LlmCaptioner::new(
                        Arc::clone(&provider),
                        config.caption_prompt.clone(),
                        settings.clone(),
                    ))
                });
                let o = o.unwrap_or_else(|| {
                    Arc::new(LlmOcr::new(
                        Arc::clone(&provider),
                        config.ocr_prompt.clone(),
                        settings.clone(),
                    ))
                });
                (c, o)
            }
        };

        let detector = self.detector.unwrap_or_else(|| {
            Some(Arc::new(TesseractDetector::new(
                config.tesseract_path.clone(),
                config.ocr_language.clone(),
            )) as Arc<dyn TextDetector>)
        });

        let rasterizer = self.rasterizer.unwrap_or_else(|| {
            Arc::new(PdfiumRasterizer::new(
                config.max_rendered_pixels,
                config.password.clone(),
            ))
        });

        let primary_speech = self.primary_speech.unwrap_or_else(|| {
            Arc::new(NeuralSpeechEngine::new(
                config.azure_speech_key.clone(),
                config.azure_speech_region.clone(),
                config.speech_timeout_secs,
            ))
        });
        let fallback_speech = self.fallback_speech.unwrap_or_else(|| {
            Arc::new(BasicSpeechEngine::new(
                config.speech_language.clone(),
                config.speech_timeout_secs,
            ))
        });

        let extractor = VisionExtractor::new(
            captioner,
            ocr,
            detector,
            ExtractionSettings::from_config(&config),
        );
        // Probe the fallback tier now so the first page doesn't pay for it.
        extractor.fallback_ready();

        Ok(Narrator {
            rasterizer,
            extractor,
            composer: NarrationComposer::new(config.min_narration_chars),
            synthesizer: SpeechSynthesizer::new(
                primary_speech,
                fallback_speech,
                config.prosody.clone(),
            ),
            store: ArtifactStore::new(
                config.output_dir.clone(),
                config.public_url_prefix.clone(),
            ),
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
            config,
        })
    }
}

// ── Free functions ───────────────────────────────────────────────────────

/// Convert a PDF path or URL to narrated audio with a one-off narrator.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &NarrationConfig,
) -> Result<ConversionOutput, NarrationError> {
    Narrator::from_config(config.clone())?
        .convert(input_str.as_ref())
        .await
}

/// Blocking wrapper around [`convert`]. Creates its own tokio runtime.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &NarrationConfig,
) -> Result<ConversionOutput, NarrationError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| NarrationError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(input_str, config))
}

/// Convert in-memory PDF bytes; `name` supplies the artifact base name.
pub async fn convert_from_bytes(
    bytes: &[u8],
    name: &str,
    config: &NarrationConfig,
) -> Result<ConversionOutput, NarrationError> {
    Narrator::from_config(config.clone())?
        .convert_from_bytes(bytes, name)
        .await
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, NarrationError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        NarrationError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, most specific first:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. `ProviderFactory::from_env` auto-detection
fn resolve_provider(config: &NarrationConfig) -> Result<Arc<dyn LLMProvider>, NarrationError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| NarrationError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
