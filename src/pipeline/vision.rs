//! Vision-model engines: page captioning and primary OCR.
//!
//! Both engines send one page image to a multimodal LLM through
//! `edgequake-llm` and differ only in the prompt and in how the reply is
//! read. Prompts live in [`crate::prompts`].
//!
//! ## Retry Strategy
//!
//! 429 / 503 answers are common when several pages are in flight. Each call
//! is retried with exponential backoff (`retry_backoff_ms * 2^attempt`):
//! 500 ms → 1 s → 2 s with the defaults.

use crate::config::NarrationConfig;
use crate::error::VisionError;
use crate::pipeline::encode::encode_page;
use crate::prompts::{strip_no_text, CAPTION_PROMPT, OCR_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Describes the scene on a page.
#[async_trait]
pub trait Captioner: Send + Sync {
    fn name(&self) -> &str;
    async fn caption(&self, image: &DynamicImage) -> Result<String, VisionError>;
}

/// Reads the printed text on a page. This is the primary OCR tier.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn read_text(&self, image: &DynamicImage) -> Result<String, VisionError>;
}

/// Sampling and retry knobs shared by both vision engines.
#[derive(Debug, Clone)]
pub struct VisionSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl VisionSettings {
    pub fn from_config(config: &NarrationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// A prompt bound to a provider, with retry.
struct PromptedVision {
    engine: &'static str,
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    settings: VisionSettings,
}

impl PromptedVision {
    async fn ask(&self, image: &DynamicImage) -> Result<String, VisionError> {
        let start = Instant::now();
        let image_data = encode_page(image).map_err(|e| VisionError::Image(e.to_string()))?;

        let messages = vec![
            ChatMessage::system(self.prompt.as_str()),
            ChatMessage::user_with_images("", vec![image_data]),
        ];
        let options = self.settings.options();
        let max_retries = self.settings.max_retries;

        let mut last_err: Option<String> = None;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                let backoff = self.settings.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    self.engine, attempt, max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        self.engine,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    warn!("{}: attempt {} failed: {}", self.engine, attempt + 1, e);
                    last_err = Some(e.to_string());
                }
            }
        }

        Err(VisionError::Provider {
            engine: self.engine.to_string(),
            retries: max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// [`Captioner`] backed by a vision LLM.
pub struct LlmCaptioner {
    inner: PromptedVision,
}

impl LlmCaptioner {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        prompt: Option<String>,
        settings: VisionSettings,
    ) -> Self {
        Self {
            inner: PromptedVision {
                engine: "vision-caption",
                provider,
                prompt: prompt.unwrap_or_else(|| CAPTION_PROMPT.to_string()),
                settings,
            },
        }
    }
}

#[async_trait]
impl Captioner for LlmCaptioner {
    fn name(&self) -> &str {
        self.inner.engine
    }

    async fn caption(&self, image: &DynamicImage) -> Result<String, VisionError> {
        Ok(self.inner.ask(image).await?.trim().to_string())
    }
}

/// [`OcrEngine`] backed by a vision LLM.
pub struct LlmOcr {
    inner: PromptedVision,
}

impl LlmOcr {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        prompt: Option<String>,
        settings: VisionSettings,
    ) -> Self {
        Self {
            inner: PromptedVision {
                engine: "vision-ocr",
                provider,
                prompt: prompt.unwrap_or_else(|| OCR_PROMPT.to_string()),
                settings,
            },
        }
    }
}

#[async_trait]
impl OcrEngine for LlmOcr {
    fn name(&self) -> &str {
        self.inner.engine
    }

    async fn read_text(&self, image: &DynamicImage) -> Result<String, VisionError> {
        let reply = self.inner.ask(image).await?;
        Ok(strip_no_text(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_settings() {
        let settings = VisionSettings::from_config(&NarrationConfig::default());
        let opts = settings.options();
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(1024));
    }
}
