//! Durable outputs: the cleaned narration text and the MP3, written side by
//! side as `{base}_cleaned.txt` and `{base}.mp3`.
//!
//! Each file is written to a `.tmp` sibling and renamed into place, so a
//! reader never sees a half-written artifact. Both temp files are written
//! before either rename; if anything fails, whatever this call put in place
//! is removed again and the caller sees the error. Existing artifacts from a
//! previous conversion are simply overwritten.

use crate::error::NarrationError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Paths (and URL) of a persisted conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredArtifacts {
    pub text_path: PathBuf,
    pub audio_path: PathBuf,
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
    public_url_prefix: Option<String>,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>, public_url_prefix: Option<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            public_url_prefix,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn text_path(&self, base: &str) -> PathBuf {
        self.output_dir.join(format!("{base}_cleaned.txt"))
    }

    pub fn audio_path(&self, base: &str) -> PathBuf {
        self.output_dir.join(format!("{base}.mp3"))
    }

    /// `{prefix}/{base}.mp3` when a public prefix is configured.
    pub fn audio_url(&self, base: &str) -> Option<String> {
        self.public_url_prefix
            .as_ref()
            .map(|prefix| format!("{}/{}.mp3", prefix.trim_end_matches('/'), base))
    }

    /// Write both artifacts or neither.
    pub async fn persist(
        &self,
        base: &str,
        text: &str,
        audio: &[u8],
    ) -> Result<StoredArtifacts, NarrationError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| NarrationError::ArtifactWriteFailed {
                path: self.output_dir.clone(),
                source: e,
            })?;

        let text_path = self.text_path(base);
        let audio_path = self.audio_path(base);
        let text_tmp = tmp_sibling(&text_path);
        let audio_tmp = tmp_sibling(&audio_path);

        let staged = async {
            write(&text_tmp, text.as_bytes()).await?;
            write(&audio_tmp, audio).await
        }
        .await;
        if let Err(e) = staged {
            remove_quietly(&text_tmp).await;
            remove_quietly(&audio_tmp).await;
            return Err(e);
        }

        // Audio first. Text never lands without its audio, and a failed
        // audio rename leaves any previous pair intact.
        if let Err(e) = rename(&audio_tmp, &audio_path).await {
            remove_quietly(&audio_tmp).await;
            remove_quietly(&text_tmp).await;
            return Err(e);
        }
        if let Err(e) = rename(&text_tmp, &text_path).await {
            remove_quietly(&text_tmp).await;
            return Err(e);
        }

        debug!(
            "Wrote {} and {}",
            text_path.display(),
            audio_path.display()
        );
        Ok(StoredArtifacts {
            audio_url: self.audio_url(base),
            text_path,
            audio_path,
        })
    }

    /// Read the persisted narration back.
    pub async fn read_narration(&self, base: &str) -> Result<String, NarrationError> {
        let path = self.text_path(base);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| NarrationError::ArtifactReadFailed { path, source: e })
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write(path: &Path, bytes: &[u8]) -> Result<(), NarrationError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| NarrationError::ArtifactWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn rename(from: &Path, to: &Path) -> Result<(), NarrationError> {
    tokio::fs::rename(from, to)
        .await
        .map_err(|e| NarrationError::ArtifactWriteFailed {
            path: to.to_path_buf(),
            source: e,
        })
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}
