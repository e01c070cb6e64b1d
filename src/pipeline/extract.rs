//! Per-page text extraction: caption plus two-tier OCR.
//!
//! ```text
//!            ┌─ captioner ──────────────────────────────┐
//! page ──────┤                                          ├─▶ ExtractionResult
//!            └─ vision OCR ─(< 5 chars or error)─▶ tesseract ─▶ clean_text
//! ```
//!
//! The caption is best effort. OCR falls back to the local text detector when
//! the vision model returns too little; the detector's low-confidence regions
//! are dropped before the rest are joined. Nothing here fails a document: a
//! page where every engine came up empty yields an empty result and a
//! [`PageError::ExtractionDegraded`].

use crate::config::NarrationConfig;
use crate::error::{PageError, VisionError};
use crate::fallback::{with_fallback, Tier};
use crate::pipeline::render::Page;
use crate::pipeline::sanitize::clean_text;
use crate::pipeline::tesseract::{TextDetector, TextRegion};
use crate::pipeline::vision::{Captioner, OcrEngine};
use image::imageops::FilterType;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which OCR tier produced `ocr_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrSource {
    Primary,
    Fallback,
    /// Neither tier produced text.
    #[default]
    None,
}

/// What one page yielded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub caption: String,
    /// OCR output after [`clean_text`]; empty when `source` is `None`.
    pub ocr_text: String,
    pub source: OcrSource,
}

impl ExtractionResult {
    /// OCR text if any, else the caption, else empty.
    pub fn narration_text(&self) -> &str {
        let ocr = self.ocr_text.trim();
        if !ocr.is_empty() {
            return ocr;
        }
        self.caption.trim()
    }
}

/// Thresholds for the OCR tiers.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    /// Primary OCR output shorter than this (after trimming) is insufficient.
    pub min_ocr_chars: usize,
    /// Longest edge handed to the fallback detector.
    pub fallback_max_dimension: u32,
    /// Regions at or below this confidence are discarded.
    pub min_region_confidence: f32,
}

impl ExtractionSettings {
    pub fn from_config(config: &NarrationConfig) -> Self {
        Self {
            min_ocr_chars: config.min_ocr_chars,
            fallback_max_dimension: config.fallback_max_dimension,
            min_region_confidence: config.min_region_confidence,
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            min_ocr_chars: 5,
            fallback_max_dimension: 1500,
            min_region_confidence: 0.25,
        }
    }
}

/// Runs the captioner and both OCR tiers over a page.
///
/// The fallback detector's availability is probed once, on first use, and
/// remembered for the life of the extractor.
pub struct VisionExtractor {
    captioner: Arc<dyn Captioner>,
    ocr: Arc<dyn OcrEngine>,
    detector: Option<Arc<dyn TextDetector>>,
    settings: ExtractionSettings,
    fallback_ready: OnceCell<bool>,
}

impl VisionExtractor {
    pub fn new(
        captioner: Arc<dyn Captioner>,
        ocr: Arc<dyn OcrEngine>,
        detector: Option<Arc<dyn TextDetector>>,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            captioner,
            ocr,
            detector,
            settings,
            fallback_ready: OnceCell::new(),
        }
    }

    /// Whether the fallback OCR tier can run. Checked once.
    pub fn fallback_ready(&self) -> bool {
        *self.fallback_ready.get_or_init(|| match &self.detector {
            Some(d) if d.is_available() => {
                debug!("Fallback OCR engine '{}' is available", d.name());
                true
            }
            Some(d) => {
                warn!(
                    "Fallback OCR engine '{}' is not available; OCR fallback disabled",
                    d.name()
                );
                false
            }
            None => false,
        })
    }

    /// Extract caption and OCR text from a page. Consumes the page so its
    /// bitmap is released as soon as extraction finishes.
    pub async fn extract(&self, page: Page) -> (ExtractionResult, Option<PageError>) {
        let page_num = page.number();
        let image = page.image;

        let (caption, ocr) = tokio::join!(self.captioner.caption(&image), self.read_ocr(&image));
        drop(image);

        let mut problems: Vec<String> = Vec::new();

        let caption = caption.unwrap_or_else(|e| {
            warn!("Page {}: caption failed: {}", page_num, e);
            problems.push(format!("caption: {e}"));
            String::new()
        });

        let (ocr_text, source) = match ocr {
            Ok((raw, tier)) => {
                let cleaned = clean_text(&raw);
                if cleaned.is_empty() {
                    (cleaned, OcrSource::None)
                } else {
                    let source = match tier {
                        Tier::Primary => OcrSource::Primary,
                        Tier::Fallback => OcrSource::Fallback,
                    };
                    (cleaned, source)
                }
            }
            Err(reason) => {
                debug!("Page {}: no OCR text: {}", page_num, reason);
                problems.push(format!("ocr: {reason}"));
                (String::new(), OcrSource::None)
            }
        };

        let result = ExtractionResult {
            caption,
            ocr_text,
            source,
        };

        let error = if result.narration_text().is_empty() {
            let detail = if problems.is_empty() {
                "no caption or text found".to_string()
            } else {
                problems.join("; ")
            };
            Some(PageError::ExtractionDegraded {
                page: page_num,
                detail,
            })
        } else {
            None
        };

        debug!(
            "Page {}: ocr source {:?}, {} chars selected",
            page_num,
            result.source,
            result.narration_text().len()
        );
        (result, error)
    }

    /// Primary OCR, falling back to the detector when the primary result is
    /// too short or fails. The error string describes both tiers.
    async fn read_ocr(&self, image: &DynamicImage) -> Result<(String, Tier), String> {
        let min = self.settings.min_ocr_chars;
        with_fallback(
            self.ocr.read_text(image),
            |text: &String| text.trim().chars().count() >= min,
            |_| self.fallback_ocr(image),
        )
        .await
        .map(|t| (t.value, t.tier))
        .map_err(|e| e.to_string())
    }

    async fn fallback_ocr(&self, image: &DynamicImage) -> Result<String, VisionError> {
        let detector = match &self.detector {
            Some(d) if self.fallback_ready() => d,
            _ => return Err(VisionError::Unavailable("fallback OCR".to_string())),
        };

        let scaled = downscale(image, self.settings.fallback_max_dimension);
        let regions = detector.detect(&scaled).await?;
        Ok(join_regions(&regions, self.settings.min_region_confidence))
    }
}

/// Target size with the longest edge at most `max`, aspect preserved.
pub fn downscale_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let scale = max as f64 / width.max(height) as f64;
    let w = ((width as f64 * scale).round() as u32).clamp(1, max);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max);
    (w, h)
}

fn downscale(image: &DynamicImage, max: u32) -> Cow<'_, DynamicImage> {
    let (w, h) = downscale_dimensions(image.width(), image.height(), max);
    if (w, h) == (image.width(), image.height()) {
        Cow::Borrowed(image)
    } else {
        debug!(
            "Downscaling {}x{} → {}x{} for fallback OCR",
            image.width(),
            image.height(),
            w,
            h
        );
        Cow::Owned(image.resize_exact(w, h, FilterType::Triangle))
    }
}

/// Join regions whose confidence is strictly above `threshold`, in order.
pub fn join_regions(regions: &[TextRegion], threshold: f32) -> String {
    regions
        .iter()
        .filter(|r| r.confidence > threshold)
        .map(|r| r.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedCaption(Result<String, VisionError>);

    #[async_trait]
    impl Captioner for FixedCaption {
        fn name(&self) -> &str {
            "fixed-caption"
        }
        async fn caption(&self, _image: &DynamicImage) -> Result<String, VisionError> {
            self.0.clone()
        }
    }

    struct FixedOcr(Result<String, VisionError>);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        fn name(&self) -> &str {
            "fixed-ocr"
        }
        async fn read_text(&self, _image: &DynamicImage) -> Result<String, VisionError> {
            self.0.clone()
        }
    }

    struct FakeDetector {
        available: bool,
        regions: Vec<TextRegion>,
        probes: AtomicUsize,
        calls: AtomicU32,
        seen_size: Mutex<Option<(u32, u32)>>,
    }

    impl FakeDetector {
        fn new(available: bool, regions: Vec<TextRegion>) -> Self {
            Self {
                available,
                regions,
                probes: AtomicUsize::new(0),
                calls: AtomicU32::new(0),
                seen_size: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TextDetector for FakeDetector {
        fn name(&self) -> &str {
            "fake-detector"
        }
        fn is_available(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.available
        }
        async fn detect(&self, image: &DynamicImage) -> Result<Vec<TextRegion>, VisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_size.lock().unwrap() = Some((image.width(), image.height()));
            Ok(self.regions.clone())
        }
    }

    fn region(text: &str, confidence: f32) -> TextRegion {
        TextRegion {
            text: text.to_string(),
            confidence,
        }
    }

    fn page(w: u32, h: u32) -> Page {
        Page {
            index: 0,
            image: DynamicImage::new_rgb8(w, h),
        }
    }

    fn extractor(
        caption: Result<String, VisionError>,
        ocr: Result<String, VisionError>,
        detector: Option<Arc<FakeDetector>>,
    ) -> VisionExtractor {
        VisionExtractor::new(
            Arc::new(FixedCaption(caption)),
            Arc::new(FixedOcr(ocr)),
            detector.map(|d| d as Arc<dyn TextDetector>),
            ExtractionSettings::default(),
        )
    }

    fn provider_down() -> VisionError {
        VisionError::Provider {
            engine: "vision-ocr".into(),
            retries: 3,
            detail: "HTTP 503".into(),
        }
    }

    #[tokio::test]
    async fn primary_ocr_wins_when_long_enough() {
        let detector = Arc::new(FakeDetector::new(true, vec![region("unused", 0.9)]));
        let ex = extractor(
            Ok("A king sits.".into()),
            Ok("Hello King!".into()),
            Some(detector.clone()),
        );
        let (result, error) = ex.extract(page(10, 10)).await;
        assert_eq!(result.source, OcrSource::Primary);
        assert_eq!(result.ocr_text, "Hello King!");
        assert_eq!(result.narration_text(), "Hello King!");
        assert!(error.is_none());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_primary_falls_back_and_filters_regions() {
        let detector = Arc::new(FakeDetector::new(
            true,
            vec![
                region("Where is", 0.9),
                region("smudge", 0.25),
                region("my cheese?", 0.6),
            ],
        ));
        let ex = extractor(Ok(String::new()), Ok("Hi".into()), Some(detector.clone()));
        let (result, _) = ex.extract(page(10, 10)).await;
        assert_eq!(result.source, OcrSource::Fallback);
        assert_eq!(result.ocr_text, "Where is my cheese?");
    }

    #[tokio::test]
    async fn failing_primary_falls_back() {
        let detector = Arc::new(FakeDetector::new(true, vec![region("Run, mouse!", 0.8)]));
        let ex = extractor(Ok(String::new()), Err(provider_down()), Some(detector));
        let (result, error) = ex.extract(page(10, 10)).await;
        assert_eq!(result.source, OcrSource::Fallback);
        assert_eq!(result.ocr_text, "Run, mouse!");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn fallback_image_is_downscaled() {
        let detector = Arc::new(FakeDetector::new(true, vec![region("Big page", 0.9)]));
        let ex = extractor(Ok(String::new()), Ok(String::new()), Some(detector.clone()));
        ex.extract(page(3000, 1500)).await;
        assert_eq!(*detector.seen_size.lock().unwrap(), Some((1500, 750)));
    }

    #[tokio::test]
    async fn caption_used_when_no_ocr() {
        let ex = extractor(Ok("A king sits on a throne.".into()), Ok(String::new()), None);
        let (result, error) = ex.extract(page(10, 10)).await;
        assert_eq!(result.source, OcrSource::None);
        assert_eq!(result.narration_text(), "A king sits on a throne.");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn everything_failing_is_degraded_not_fatal() {
        let ex = extractor(Err(provider_down()), Err(provider_down()), None);
        let (result, error) = ex.extract(page(10, 10)).await;
        assert_eq!(result, ExtractionResult::default());
        match error {
            Some(PageError::ExtractionDegraded { page, detail }) => {
                assert_eq!(page, 1);
                assert!(detail.contains("caption"), "got: {detail}");
                assert!(detail.contains("ocr"), "got: {detail}");
            }
            other => panic!("expected degraded page, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unavailable_detector_probed_once() {
        let detector = Arc::new(FakeDetector::new(false, vec![region("never", 0.9)]));
        let ex = extractor(Ok(String::new()), Ok(String::new()), Some(detector.clone()));
        ex.extract(page(10, 10)).await;
        ex.extract(page(10, 10)).await;
        assert_eq!(detector.probes.load(Ordering::SeqCst), 1);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
        assert!(!ex.fallback_ready());
    }

    #[tokio::test]
    async fn ocr_output_is_cleaned() {
        let ex = extractor(
            Ok(String::new()),
            Ok("[00:00:01] Wowl visit www.site.com now".into()),
            None,
        );
        let (result, _) = ex.extract(page(10, 10)).await;
        assert_eq!(result.ocr_text, "Wow! visit now");
    }

    #[test]
    fn downscale_keeps_small_images() {
        assert_eq!(downscale_dimensions(800, 600, 1500), (800, 600));
        assert_eq!(downscale_dimensions(1500, 1500, 1500), (1500, 1500));
    }

    #[test]
    fn downscale_preserves_aspect() {
        assert_eq!(downscale_dimensions(3000, 1500, 1500), (1500, 750));
        assert_eq!(downscale_dimensions(1000, 4000, 1500), (375, 1500));
    }

    #[test]
    fn join_drops_regions_at_threshold() {
        let regions = vec![region("keep", 0.26), region("drop", 0.25), region("  ", 0.9)];
        assert_eq!(join_regions(&regions, 0.25), "keep");
    }
}
