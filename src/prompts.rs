//! Prompts for the vision-model captioning and OCR engines.
//!
//! Both can be overridden through [`crate::config::NarrationConfig`]; the
//! constants here are used when no override is set.

/// Sentinel the OCR prompt asks the model to answer with when a page has no
/// legible lettering. Mapped to empty output so the fallback tier runs.
pub const NO_TEXT: &str = "NO_TEXT";

/// Scene description for one comic page.
pub const CAPTION_PROMPT: &str = r#"You are describing a single page of an illustrated comic book for a listener who cannot see it.

Write one or two plain sentences describing what happens in the scene: who is present and what they are doing.

Rules:
- Plain prose only. No lists, no headings, no markdown.
- Do NOT transcribe speech bubbles or captions; another step does that.
- Do NOT start with "Image Caption:", "Scene:" or any other label.
- Do NOT mention panels, page numbers, artwork style or watermarks."#;

/// Transcription of the printed lettering on one comic page.
pub const OCR_PROMPT: &str = r#"You are transcribing the printed lettering of a single comic book page.

Rules:
- Transcribe the text in speech bubbles, thought bubbles and caption boxes exactly as printed.
- Follow reading order: panels left to right, top to bottom; bubbles in the order they are read.
- Join everything into plain sentences separated by single spaces. No line breaks, no markdown.
- Ignore page numbers, website addresses, publisher watermarks and sound effects drawn into the art.
- Do NOT describe the pictures and do NOT add commentary.
- If the page has no legible lettering, answer exactly: NO_TEXT"#;

/// Map a model reply to transcribed text: the [`NO_TEXT`] sentinel (alone,
/// possibly with surrounding punctuation or quotes) becomes empty.
pub fn strip_no_text(reply: &str) -> String {
    let trimmed = reply.trim();
    let bare = trimmed.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_');
    if bare.eq_ignore_ascii_case(NO_TEXT) {
        String::new()
    } else {
        trimmed.to_string()
    }
}
