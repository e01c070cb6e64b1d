//! Image encoding: `DynamicImage` → PNG bytes, optionally base64-wrapped
//! in `ImageData` for the vision LLM request body.
//!
//! PNG keeps lettering crisp; JPEG ringing around speech-bubble text hurts
//! both the vision model and tesseract.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Encode a page as a base64 PNG attachment with `detail: "high"` so small
/// bubble text survives the provider's tiling.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let b64 = STANDARD.encode(encode_png(img)?);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
