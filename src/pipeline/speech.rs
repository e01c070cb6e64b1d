//! Speech synthesis: narration text → MP3 bytes.
//!
//! Two engines sit behind the [`SpeechEngine`] seam:
//!
//! | Engine | Service | Voice / prosody |
//! |--------|---------|-----------------|
//! | [`NeuralSpeechEngine`] | Azure Speech REST (SSML) | yes |
//! | [`BasicSpeechEngine`]  | Google Translate TTS     | no  |
//!
//! [`SpeechSynthesizer`] renders with the neural engine and falls back to the
//! basic one on error or empty audio. Audio is rendered fully in memory
//! before anything is written, so a failed synthesis leaves no artifacts.

use crate::error::{NarrationError, SpeechError};
use crate::fallback::{with_fallback, Tier};
use crate::pipeline::artifacts::{ArtifactStore, StoredArtifacts};
use crate::voice::{voice_for, SpeakerRole, VoiceProfile};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Speaking rate and pitch offsets, in SSML syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct Prosody {
    pub rate: String,
    pub pitch: String,
}

impl Default for Prosody {
    fn default() -> Self {
        Self {
            rate: "+0%".to_string(),
            pitch: "+0Hz".to_string(),
        }
    }
}

/// Everything an engine needs to render one narration.
#[derive(Debug, Clone, Copy)]
pub struct SpeechRequest<'a> {
    pub text: &'a str,
    pub voice: &'a VoiceProfile,
    pub prosody: &'a Prosody,
}

/// Renders text to MP3 audio.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn synthesize(&self, request: &SpeechRequest<'_>) -> Result<Vec<u8>, SpeechError>;
}

// ── Neural engine ────────────────────────────────────────────────────────────

const AZURE_OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Azure Speech REST synthesis with the selected neural voice.
pub struct NeuralSpeechEngine {
    client: reqwest::Client,
    key: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
}

impl NeuralSpeechEngine {
    pub fn new(key: Option<String>, region: Option<String>, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            key: key.filter(|k| !k.is_empty()),
            region: region.filter(|r| !r.is_empty()),
            endpoint: None,
        }
    }

    /// Post to a fixed URL instead of the regional endpoint.
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    fn url(&self) -> Option<String> {
        if let Some(url) = &self.endpoint {
            return Some(url.clone());
        }
        self.region
            .as_ref()
            .map(|r| format!("https://{r}.tts.speech.microsoft.com/cognitiveservices/v1"))
    }
}

#[async_trait]
impl SpeechEngine for NeuralSpeechEngine {
    fn name(&self) -> &str {
        "azure-neural"
    }

    async fn synthesize(&self, request: &SpeechRequest<'_>) -> Result<Vec<u8>, SpeechError> {
        let (key, url) = match (&self.key, self.url()) {
            (Some(key), Some(url)) => (key, url),
            _ => {
                return Err(SpeechError::NotConfigured(
                    "azure-neural (set AZURE_SPEECH_KEY and AZURE_SPEECH_REGION)".to_string(),
                ))
            }
        };

        let body = build_ssml(request);
        debug!(
            "azure-neural: {} chars with voice {}",
            request.text.len(),
            request.voice.voice_id
        );

        let response = self
            .client
            .post(url)
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", AZURE_OUTPUT_FORMAT)
            .header("User-Agent", concat!("comic-narrator/", env!("CARGO_PKG_VERSION")))
            .body(body)
            .send()
            .await
            .map_err(|e| SpeechError::Request(e.to_string()))?;

        read_audio(response).await
    }
}

/// SSML document with the voice and prosody applied.
pub fn build_ssml(request: &SpeechRequest<'_>) -> String {
    let lang: String = request.voice.voice_id.split('-').take(2).collect::<Vec<_>>().join("-");
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{lang}'>\
<voice name='{voice}'><prosody rate='{rate}' pitch='{pitch}'>{text}</prosody></voice></speak>",
        voice = request.voice.voice_id,
        rate = escape_xml(&request.prosody.rate),
        pitch = escape_xml(&request.prosody.pitch),
        text = escape_xml(request.text),
    )
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Basic engine ─────────────────────────────────────────────────────────────

const BASIC_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Longest text the basic endpoint accepts per request.
pub const BASIC_CHUNK_CHARS: usize = 200;

/// Google Translate TTS. One fixed voice per language, no prosody control.
pub struct BasicSpeechEngine {
    client: reqwest::Client,
    language: String,
    endpoint: String,
}

impl BasicSpeechEngine {
    pub fn new(language: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            language: language.into(),
            endpoint: BASIC_TTS_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }
}

#[async_trait]
impl SpeechEngine for BasicSpeechEngine {
    fn name(&self) -> &str {
        "basic-tts"
    }

    async fn synthesize(&self, request: &SpeechRequest<'_>) -> Result<Vec<u8>, SpeechError> {
        let chunks = chunk_text(request.text, BASIC_CHUNK_CHARS);
        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("ie", "UTF-8"),
                    ("q", chunk.as_str()),
                    ("tl", self.language.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                    ("client", "tw-ob"),
                ])
                .send()
                .await
                .map_err(|e| SpeechError::Request(e.to_string()))?;
            audio.extend(read_audio(response).await?);
        }

        debug!("basic-tts: {} chunks → {} bytes", chunks.len(), audio.len());
        Ok(audio)
    }
}

/// Split `text` into chunks of at most `max` characters, breaking on
/// whitespace. A single word longer than `max` is split mid-word.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ── Shared HTTP helpers ──────────────────────────────────────────────────────

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

async fn read_audio(response: reqwest::Response) -> Result<Vec<u8>, SpeechError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SpeechError::Http {
            status: status.as_u16(),
            body: body.chars().take(300).collect(),
        });
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| SpeechError::Request(e.to_string()))?;
    if bytes.is_empty() {
        return Err(SpeechError::EmptyAudio);
    }
    Ok(bytes.to_vec())
}

// ── Synthesizer ──────────────────────────────────────────────────────────────

/// Audio rendered in memory, not yet written.
#[derive(Debug, Clone)]
pub struct RenderedAudio {
    pub bytes: Vec<u8>,
    pub voice: &'static VoiceProfile,
    pub tier: Tier,
    pub engine: String,
}

/// Where the narration ended up after [`SpeechSynthesizer::synthesize`].
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub audio: RenderedAudio,
    pub artifacts: StoredArtifacts,
}

/// How the primary engine fell short, for the fallback log line.
fn primary_outcome(err: Option<&SpeechError>) -> String {
    match err {
        Some(e) => format!("failed: {e}"),
        None => "gave no audio".to_string(),
    }
}

/// Voice-aware synthesis with an engine fallback.
pub struct SpeechSynthesizer {
    primary: Arc<dyn SpeechEngine>,
    fallback: Arc<dyn SpeechEngine>,
    prosody: Prosody,
}

impl SpeechSynthesizer {
    pub fn new(
        primary: Arc<dyn SpeechEngine>,
        fallback: Arc<dyn SpeechEngine>,
        prosody: Prosody,
    ) -> Self {
        Self {
            primary,
            fallback,
            prosody,
        }
    }

    /// Render `text` with the voice for `role`, falling back to the basic
    /// engine when the primary errors or returns no audio.
    pub async fn render(&self, text: &str, role: SpeakerRole) -> Result<RenderedAudio, NarrationError> {
        let voice = voice_for(role);
        let request = SpeechRequest {
            text,
            voice,
            prosody: &self.prosody,
        };

        let rendered = with_fallback(
            self.primary.synthesize(&request),
            |bytes: &Vec<u8>| !bytes.is_empty(),
            |primary_err: Option<&SpeechError>| {
                warn!(
                    "Speech engine '{}' {}; falling back to '{}'",
                    self.primary.name(),
                    primary_outcome(primary_err),
                    self.fallback.name()
                );
                self.fallback.synthesize(&request)
            },
        )
        .await
        .map_err(|e| NarrationError::SynthesisUnavailable {
            primary: format!("{}: {}", self.primary.name(), e.primary_reason()),
            fallback: format!("{}: {}", self.fallback.name(), e.fallback),
        })?;

        if rendered.value.is_empty() {
            return Err(NarrationError::SynthesisUnavailable {
                primary: format!("{}: no audio", self.primary.name()),
                fallback: format!("{}: {}", self.fallback.name(), SpeechError::EmptyAudio),
            });
        }

        let engine = match rendered.tier {
            Tier::Primary => self.primary.name(),
            Tier::Fallback => self.fallback.name(),
        }
        .to_string();
        info!(
            "Synthesized {} bytes with {} ({})",
            rendered.value.len(),
            engine,
            voice.voice_id
        );

        Ok(RenderedAudio {
            bytes: rendered.value,
            voice,
            tier: rendered.tier,
            engine,
        })
    }

    /// Render, then write the narration text and audio together under `base`.
    /// Nothing is written when rendering fails.
    pub async fn synthesize(
        &self,
        text: &str,
        role: SpeakerRole,
        base: &str,
        store: &ArtifactStore,
    ) -> Result<SynthesisOutput, NarrationError> {
        let audio = self.render(text, role).await?;
        let artifacts = store.persist(base, text, &audio.bytes).await?;
        Ok(SynthesisOutput { audio, artifacts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeEngine {
        name: &'static str,
        result: Result<Vec<u8>, SpeechError>,
        calls: AtomicUsize,
        voices: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn new(name: &'static str, result: Result<Vec<u8>, SpeechError>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicUsize::new(0),
                voices: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SpeechEngine for FakeEngine {
        fn name(&self) -> &str {
            self.name
        }
        async fn synthesize(&self, request: &SpeechRequest<'_>) -> Result<Vec<u8>, SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.voices
                .lock()
                .unwrap()
                .push(request.voice.voice_id.to_string());
            self.result.clone()
        }
    }

    fn synth(primary: Arc<FakeEngine>, fallback: Arc<FakeEngine>) -> SpeechSynthesizer {
        SpeechSynthesizer::new(primary, fallback, Prosody::default())
    }

    #[tokio::test]
    async fn primary_audio_uses_role_voice() {
        let primary = FakeEngine::new("neural", Ok(vec![1, 2, 3]));
        let fallback = FakeEngine::new("basic", Ok(vec![9]));
        let out = synth(primary.clone(), fallback.clone())
            .render("The queen waved.", SpeakerRole::Female)
            .await
            .unwrap();
        assert_eq!(out.tier, Tier::Primary);
        assert_eq!(out.engine, "neural");
        assert_eq!(out.voice.voice_id, "en-US-JennyNeural");
        assert_eq!(primary.voices.lock().unwrap()[0], "en-US-JennyNeural");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_primary_audio_falls_back() {
        let primary = FakeEngine::new("neural", Ok(Vec::new()));
        let fallback = FakeEngine::new("basic", Ok(vec![7, 7]));
        let out = synth(primary, fallback)
            .render("Hello there.", SpeakerRole::Narrator)
            .await
            .unwrap();
        assert_eq!(out.tier, Tier::Fallback);
        assert_eq!(out.bytes, vec![7, 7]);
    }

    #[tokio::test]
    async fn primary_error_falls_back() {
        let primary = FakeEngine::new(
            "neural",
            Err(SpeechError::NotConfigured("azure-neural".into())),
        );
        let fallback = FakeEngine::new("basic", Ok(vec![1]));
        let out = synth(primary, fallback)
            .render("Hello there.", SpeakerRole::Narrator)
            .await
            .unwrap();
        assert_eq!(out.engine, "basic");
    }

    #[tokio::test]
    async fn both_failing_is_unavailable() {
        let primary = FakeEngine::new(
            "neural",
            Err(SpeechError::Http {
                status: 401,
                body: "denied".into(),
            }),
        );
        let fallback = FakeEngine::new("basic", Err(SpeechError::Request("dns".into())));
        let err = synth(primary, fallback)
            .render("Hello there.", SpeakerRole::Male)
            .await
            .unwrap_err();
        match err {
            NarrationError::SynthesisUnavailable { primary, fallback } => {
                assert!(primary.contains("401"), "got {primary}");
                assert!(fallback.contains("dns"), "got {fallback}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failed_synthesis_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), None);
        let primary = FakeEngine::new("neural", Err(SpeechError::EmptyAudio));
        let fallback = FakeEngine::new("basic", Err(SpeechError::EmptyAudio));
        let err = synth(primary, fallback)
            .synthesize("Hello there.", SpeakerRole::Narrator, "story", &store)
            .await;
        assert!(err.is_err());
        assert!(!store.text_path("story").exists());
        assert!(!store.audio_path("story").exists());
    }

    #[tokio::test]
    async fn neural_without_credentials_is_not_configured() {
        let engine = NeuralSpeechEngine::new(None, Some("westus".into()), 5);
        let prosody = Prosody::default();
        let request = SpeechRequest {
            text: "hi",
            voice: voice_for(SpeakerRole::Narrator),
            prosody: &prosody,
        };
        let err = engine.synthesize(&request).await.unwrap_err();
        assert!(matches!(err, SpeechError::NotConfigured(_)));
    }

    #[test]
    fn ssml_carries_voice_prosody_and_escaped_text() {
        let prosody = Prosody::default();
        let request = SpeechRequest {
            text: "Tom & Jerry <run>",
            voice: voice_for(SpeakerRole::OldMale),
            prosody: &prosody,
        };
        let ssml = build_ssml(&request);
        assert!(ssml.contains("xml:lang='en-US'"));
        assert!(ssml.contains("<voice name='en-US-RogerNeural'>"));
        assert!(ssml.contains("rate='+0%' pitch='+0Hz'"));
        assert!(ssml.contains("Tom &amp; Jerry &lt;run&gt;"));
    }

    #[test]
    fn fallback_log_names_the_primary_failure() {
        let http = SpeechError::Http {
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(primary_outcome(Some(&http)), "failed: HTTP 503: busy");
        assert!(primary_outcome(Some(&SpeechError::NotConfigured("azure-neural".into())))
            .contains("not configured"));
        assert_eq!(primary_outcome(None), "gave no audio");
    }

    #[test]
    fn escape_quotes() {
        assert_eq!(escape_xml(r#"it's "fine""#), "it&apos;s &quot;fine&quot;");
    }

    #[test]
    fn chunks_respect_limit_and_word_boundaries() {
        let text = "one two three four five six";
        let chunks = chunk_text(text, 9);
        assert_eq!(chunks, vec!["one two", "three", "four five", "six"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 9));
    }

    #[test]
    fn long_words_are_split() {
        let chunks = chunk_text("abcdefghij xy", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn chunking_keeps_all_words() {
        let text = "Once upon a time there was a King. ".repeat(20);
        let chunks = chunk_text(&text, BASIC_CHUNK_CHARS);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= BASIC_CHUNK_CHARS));
        assert_eq!(
            chunks.join(" "),
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        );
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("   ", 200).is_empty());
    }
}
