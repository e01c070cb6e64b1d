//! Input resolution: normalise a user-supplied path or URL to a local PDF.
//!
//! pdfium opens files by path, so URL inputs are downloaded into a `TempDir`
//! that lives as long as the returned [`ResolvedInput`]. Both paths check the
//! `%PDF` magic bytes up front so a JPEG renamed to `.pdf` fails with a clear
//! [`NarrationError::SourceUnreadable`] instead of an opaque pdfium error.

use crate::error::NarrationError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` is held so the download survives until conversion ends.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a readable local PDF, downloading URLs first.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, NarrationError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn unreadable(path: &Path, reason: impl Into<String>) -> NarrationError {
    NarrationError::SourceUnreadable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, NarrationError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(unreadable(&path, "file not found"));
    }

    let mut f = std::fs::File::open(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => unreadable(&path, "permission denied"),
        _ => unreadable(&path, e.to_string()),
    })?;

    let mut magic = [0u8; 4];
    f.read_exact(&mut magic)
        .map_err(|_| unreadable(&path, "file is too short to be a PDF"))?;
    check_magic(&path, &magic)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

fn check_magic(path: &Path, bytes: &[u8]) -> Result<(), NarrationError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let shown: Vec<u8> = bytes.iter().take(4).copied().collect();
        return Err(unreadable(
            path,
            format!("not a PDF (starts with {:?})", String::from_utf8_lossy(&shown)),
        ));
    }
    Ok(())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, NarrationError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| NarrationError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| NarrationError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    check_magic(&file_path, &bytes)?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| NarrationError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded {} bytes to {}", bytes.len(), file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of `url` when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

/// Name shared by both artifacts of a conversion: the source file stem with
/// anything outside `[A-Za-z0-9._-]` replaced by `_`.
///
/// `comics/The Mouse King.pdf` → `The_Mouse_King`.
pub fn artifact_base_name(source: &str) -> String {
    let name = if is_url(source) {
        filename_from_url(source)
    } else {
        source.to_string()
    };
    let stem = Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('_').is_empty() {
        "comic".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = resolve_local("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, NarrationError::SourceUnreadable { .. }));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn non_pdf_is_unreadable() {
        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        f.write_all(b"\x89PNG not a pdf").unwrap();
        let err = resolve_local(f.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("not a PDF"), "got: {err}");
    }

    #[test]
    fn empty_file_is_unreadable() {
        let f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        let err = resolve_local(f.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, NarrationError::SourceUnreadable { .. }));
    }

    #[test]
    fn pdf_magic_resolves() {
        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        let resolved = resolve_local(f.path().to_str().unwrap()).unwrap();
        assert_eq!(resolved.path(), f.path());
    }

    #[test]
    fn base_name_from_path() {
        assert_eq!(artifact_base_name("comics/The Mouse King.pdf"), "The_Mouse_King");
        assert_eq!(artifact_base_name("/tmp/story-1.pdf"), "story-1");
    }

    #[test]
    fn base_name_from_url() {
        assert_eq!(
            artifact_base_name("https://example.com/files/hanuman.pdf"),
            "hanuman"
        );
        assert_eq!(artifact_base_name("https://example.com/"), "downloaded");
    }

    #[test]
    fn base_name_never_empty() {
        assert_eq!(artifact_base_name(""), "comic");
        assert_eq!(artifact_base_name("???.pdf"), "comic");
    }

    #[test]
    fn filename_defaults_without_extension() {
        assert_eq!(filename_from_url("https://example.com/get"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://example.com/a/b.pdf"), "b.pdf");
    }
}
