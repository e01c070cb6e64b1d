//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! pdfium is a blocking C library, so rendering runs on tokio's blocking
//! pool. Resolution is driven by DPI (zoom factor `dpi / 72`) with a cap on
//! the longest edge so an oversized page cannot exhaust memory.

use crate::error::NarrationError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One rendered page. Moved into the extractor and dropped after extraction.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based page index.
    pub index: usize,
    pub image: DynamicImage,
}

impl Page {
    /// 1-based page number for logs and reports.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// Turns a PDF into pages, in page order.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, pdf_path: &Path, dpi: u32) -> Result<Vec<Page>, NarrationError>;
}

/// PDF points are 1/72 inch.
pub fn zoom_factor(dpi: u32) -> f32 {
    dpi as f32 / 72.0
}

/// [`Rasterizer`] backed by pdfium.
///
/// The library is bound from `PDFIUM_LIB_PATH` when set, otherwise from the
/// system library search path.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_rendered_pixels: u32,
    password: Option<String>,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(max_rendered_pixels: u32, password: Option<String>) -> Self {
        Self {
            max_rendered_pixels,
            password,
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }

    /// Bind to an explicit pdfium shared library instead of the environment.
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    fn bind(library_path: Option<&Path>) -> Result<Pdfium, NarrationError> {
        let bindings = match library_path {
            Some(path) => Pdfium::bind_to_library(path).map_err(|e| {
                NarrationError::PdfiumBindingFailed(format!("{}: {}", path.display(), e))
            })?,
            None => Pdfium::bind_to_system_library()
                .map_err(|e| NarrationError::PdfiumBindingFailed(e.to_string()))?,
        };
        Ok(Pdfium::new(bindings))
    }

    /// Check that pdfium can be bound, without opening a document.
    pub fn check_binding(&self) -> Result<(), NarrationError> {
        Self::bind(self.library_path.as_deref()).map(|_| ())
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(&self, pdf_path: &Path, dpi: u32) -> Result<Vec<Page>, NarrationError> {
        let path = pdf_path.to_path_buf();
        let max_pixels = self.max_rendered_pixels;
        let password = self.password.clone();
        let library_path = self.library_path.clone();

        tokio::task::spawn_blocking(move || {
            let pdfium = Self::bind(library_path.as_deref())?;
            render_blocking(&pdfium, &path, dpi, max_pixels, password.as_deref())
        })
        .await
        .map_err(|e| NarrationError::Internal(format!("Render task panicked: {e}")))?
    }
}

fn render_blocking(
    pdfium: &Pdfium,
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<Page>, NarrationError> {
    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let detail = format!("{e:?}");
        let reason = if detail.to_lowercase().contains("password") {
            if password.is_some() {
                "wrong password".to_string()
            } else {
                "encrypted; a password is required".to_string()
            }
        } else {
            detail
        };
        NarrationError::SourceUnreadable {
            path: pdf_path.to_path_buf(),
            reason,
        }
    })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages, rendering at {} DPI", total, dpi);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(zoom_factor(dpi))
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut out = Vec::with_capacity(total);
    for (index, page) in pages.iter().enumerate() {
        match page.render_with_config(&render_config) {
            Ok(bitmap) => {
                let image = bitmap.as_image();
                debug!(
                    "Rendered page {} → {}x{} px",
                    index + 1,
                    image.width(),
                    image.height()
                );
                out.push(Page { index, image });
            }
            Err(e) => warn!("Skipping page {}: render failed: {:?}", index + 1, e),
        }
    }

    Ok(out)
}
