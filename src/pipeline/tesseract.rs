//! Fallback OCR: the `tesseract` command-line engine.
//!
//! The page is written to a temporary PNG and `tesseract <png> stdout tsv`
//! is run on it. TSV output gives one row per recognised word with a
//! 0–100 confidence; words are grouped back into their text lines so each
//! line becomes one [`TextRegion`] carrying the mean confidence of its words.

use crate::error::VisionError;
use crate::pipeline::encode::encode_png;
use async_trait::async_trait;
use image::DynamicImage;
use std::io::Write;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// A detected run of text and the detector's confidence in it (0.0–1.0).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    pub text: String,
    pub confidence: f32,
}

/// Detects text regions in an image. This is the fallback OCR tier.
#[async_trait]
pub trait TextDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the detector can run at all on this machine.
    fn is_available(&self) -> bool;

    /// Regions in detection order.
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<TextRegion>, VisionError>;
}

/// [`TextDetector`] that shells out to `tesseract`.
#[derive(Debug, Clone)]
pub struct TesseractDetector {
    binary: PathBuf,
    language: String,
}

impl TesseractDetector {
    pub fn new(binary: Option<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| PathBuf::from("tesseract")),
            language: language.into(),
        }
    }

    fn resolved_binary(&self) -> Option<PathBuf> {
        which::which(&self.binary).ok()
    }
}

#[async_trait]
impl TextDetector for TesseractDetector {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        self.resolved_binary().is_some()
    }

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<TextRegion>, VisionError> {
        let failed = |detail: String| VisionError::Detector {
            engine: "tesseract".to_string(),
            detail,
        };

        let binary = self
            .resolved_binary()
            .ok_or_else(|| VisionError::Unavailable("tesseract".to_string()))?;

        let png = encode_png(image).map_err(|e| VisionError::Image(e.to_string()))?;
        let mut input = tempfile::Builder::new()
            .prefix("comic-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| failed(format!("temp file: {e}")))?;
        input
            .write_all(&png)
            .map_err(|e| failed(format!("temp file write: {e}")))?;

        let output = Command::new(binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("tsv")
            .output()
            .await
            .map_err(|e| failed(format!("could not run: {e}")))?;

        if !output.status.success() {
            return Err(failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let regions = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!("tesseract: {} line regions", regions.len());
        Ok(regions)
    }
}

/// Group TSV word rows (level 5) into line regions, in the order lines
/// first appear.
pub fn parse_tsv(tsv: &str) -> Vec<TextRegion> {
    struct Line {
        key: (u32, u32, u32, u32),
        words: Vec<String>,
        conf_sum: f32,
    }

    let mut lines: Vec<Line> = Vec::new();

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let conf: f32 = match cols[10].trim().parse() {
            Ok(c) if c >= 0.0 => c,
            _ => continue,
        };
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let key = (num(1), num(2), num(3), num(4));
        match lines.iter_mut().find(|l| l.key == key) {
            Some(line) => {
                line.words.push(word.to_string());
                line.conf_sum += conf;
            }
            None => lines.push(Line {
                key,
                words: vec![word.to_string()],
                conf_sum: conf,
            }),
        }
    }

    lines
        .into_iter()
        .map(|l| TextRegion {
            confidence: l.conf_sum / l.words.len() as f32 / 100.0,
            text: l.words.join(" "),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn row(level: u8, line: u32, word: u32, conf: f32, text: &str) -> String {
        format!("{level}\t1\t1\t1\t{line}\t{word}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn groups_words_into_lines_with_mean_confidence() {
        let tsv = [
            HEADER.to_string(),
            row(4, 1, 0, -1.0, ""),
            row(5, 1, 1, 90.0, "Hello"),
            row(5, 1, 2, 70.0, "King!"),
            row(4, 2, 0, -1.0, ""),
            row(5, 2, 1, 20.0, "zzq"),
        ]
        .join("\n");

        let regions = parse_tsv(&tsv);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].text, "Hello King!");
        assert!((regions[0].confidence - 0.8).abs() < 1e-6);
        assert_eq!(regions[1].text, "zzq");
        assert!((regions[1].confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn skips_blank_words_and_negative_confidence() {
        let tsv = [
            HEADER.to_string(),
            row(5, 1, 1, -1.0, "ghost"),
            row(5, 1, 2, 95.0, " "),
        ]
        .join("\n");
        assert!(parse_tsv(&tsv).is_empty());
    }

    #[test]
    fn empty_output_has_no_regions() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv(HEADER).is_empty());
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let detector = TesseractDetector::new(
            Some(PathBuf::from("/nonexistent/tesseract-binary")),
            "eng",
        );
        assert!(!detector.is_available());
    }

    #[tokio::test]
    async fn detect_without_binary_reports_unavailable() {
        let detector = TesseractDetector::new(
            Some(PathBuf::from("/nonexistent/tesseract-binary")),
            "eng",
        );
        let err = detector
            .detect(&DynamicImage::new_rgb8(4, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, VisionError::Unavailable(_)));
    }
}
