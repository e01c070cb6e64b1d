//! CLI binary for comic-narrator.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `NarrationConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use comic_narrator::pipeline::render::PdfiumRasterizer;
use comic_narrator::{
    classify, sanitize, voice_for, NarrationConfig, NarrationProgressCallback, Narrator,
    ProgressCallback, SpeakerRole, Tier,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page. Pages may finish out of
/// order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner only until `on_conversion_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Reading");
        self.bar.reset_eta();
    }

    fn page_elapsed_ms(&self, page_num: usize) -> u128 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl NarrationProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        let elapsed_ms = self.page_elapsed_ms(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed_ms = self.page_elapsed_ms(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_narration_ready(&self, chars: usize, role: SpeakerRole) {
        self.bar.set_prefix("Speaking");
        self.bar.set_message(format!(
            "{chars} chars as {role} ({})",
            voice_for(role).voice_id
        ));
    }

    fn on_synthesis_complete(&self, engine: &str, tier: Tier) {
        let mark = match tier {
            Tier::Primary => green("♪"),
            Tier::Fallback => cyan("♪"),
        };
        self.bar
            .println(format!("{} Voiced with {}", mark, bold(engine)));
    }

    fn on_conversion_complete(&self, total_pages: usize, pages_with_text: usize) {
        self.bar.finish_and_clear();
        let silent = total_pages.saturating_sub(pages_with_text);
        if silent == 0 {
            eprintln!(
                "{} {} pages narrated",
                green("✔"),
                bold(&pages_with_text.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages had text  ({} silent)",
                cyan("⚠"),
                bold(&pages_with_text.to_string()),
                total_pages,
                dim(&silent.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Narrate a comic into static/output/
  comic2audio mouse_tale.pdf

  # Choose the output folder and publish URLs under a CDN prefix
  comic2audio mouse_tale.pdf -o /srv/audio --public-url https://cdn.example.com/audio

  # Narrate a comic from a URL
  comic2audio https://example.com/comics/mouse_tale.pdf

  # Clean up OCR text without touching any engine
  comic2audio --sanitize-only raw_ocr.txt
  echo "Can please I have some water" | comic2audio --sanitize-only -

  # JSON report (pages, fragments, stats)
  comic2audio --json mouse_tale.pdf > report.json

OUTPUT:
  <output-dir>/<name>_cleaned.txt   sanitized narration
  <output-dir>/<name>.mp3           narrated audio

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (vision captioning + OCR)
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override vision provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override vision model ID
  AZURE_SPEECH_KEY        Azure Speech key (neural voices)
  AZURE_SPEECH_REGION     Azure Speech region, e.g. eastus
  PDFIUM_LIB_PATH         Path to libpdfium if it is not installed system-wide

  Without Azure credentials the narration is voiced by the basic TTS engine.
  Without tesseract on PATH the local OCR fallback is disabled.
"#;

/// Turn comic-book PDFs into narrated audio.
#[derive(Parser, Debug)]
#[command(
    name = "comic2audio",
    version,
    about = "Turn comic-book PDFs into narrated audio",
    long_about = "Render each page of a comic PDF, read its artwork and speech bubbles with a \
vision model (local Tesseract OCR as fallback), clean up the text, pick a voice for the story \
and speak it with Azure neural TTS (basic TTS as fallback).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF path or HTTP/HTTPS URL. With --sanitize-only: a text file, or `-` for stdin.
    input: String,

    /// Directory for the narration text and audio.
    #[arg(short, long, env = "COMIC2AUDIO_OUTPUT_DIR", default_value = "static/output")]
    output_dir: PathBuf,

    /// Public URL prefix the output directory is served under.
    #[arg(long, env = "COMIC2AUDIO_PUBLIC_URL")]
    public_url: Option<String>,

    /// Vision model ID (e.g. gpt-4.1-nano, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "COMIC2AUDIO_DPI", default_value_t = 400,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Number of pages extracted concurrently.
    #[arg(short, long, env = "COMIC2AUDIO_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "COMIC2AUDIO_PASSWORD")]
    password: Option<String>,

    /// Max vision output tokens per request.
    #[arg(long, env = "COMIC2AUDIO_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Vision temperature (0.0–2.0).
    #[arg(long, env = "COMIC2AUDIO_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per vision request.
    #[arg(long, env = "COMIC2AUDIO_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-page extraction timeout in seconds.
    #[arg(long, env = "COMIC2AUDIO_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "COMIC2AUDIO_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Path to the tesseract binary (default: looked up on PATH).
    #[arg(long, env = "COMIC2AUDIO_TESSERACT")]
    tesseract: Option<PathBuf>,

    /// Tesseract language code.
    #[arg(long, env = "COMIC2AUDIO_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Azure Speech subscription key.
    #[arg(long, env = "AZURE_SPEECH_KEY", hide_env_values = true)]
    azure_key: Option<String>,

    /// Azure Speech region.
    #[arg(long, env = "AZURE_SPEECH_REGION")]
    azure_region: Option<String>,

    /// Language for the basic TTS fallback.
    #[arg(long, env = "COMIC2AUDIO_SPEECH_LANG", default_value = "en")]
    speech_lang: String,

    /// Speaking rate for neural voices, e.g. +0% or -10%.
    #[arg(long, env = "COMIC2AUDIO_RATE", default_value = "+0%", allow_hyphen_values = true)]
    rate: String,

    /// Pitch for neural voices, e.g. +0Hz or -2Hz.
    #[arg(long, env = "COMIC2AUDIO_PITCH", default_value = "+0Hz", allow_hyphen_values = true)]
    pitch: String,

    /// Only sanitize text from INPUT and print it with the inferred voice.
    #[arg(long)]
    sanitize_only: bool,

    /// Print the ConversionOutput report as JSON.
    #[arg(long, env = "COMIC2AUDIO_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "COMIC2AUDIO_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "COMIC2AUDIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "COMIC2AUDIO_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.sanitize_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Sanitize-only mode ───────────────────────────────────────────────
    if cli.sanitize_only {
        return run_sanitize_only(&cli).await;
    }

    // ── Fail fast when pdfium is missing ─────────────────────────────────
    tokio::task::block_in_place(|| PdfiumRasterizer::new(0, None).check_binding())
        .context("PDF engine unavailable")?;

    // ── Build narrator ───────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn NarrationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let narrator = Narrator::from_config(config).context("Failed to set up engines")?;

    if !narrator.fallback_ocr_ready() && !cli.quiet && !cli.json {
        eprintln!(
            "{} tesseract not found; OCR fallback disabled",
            cyan("⚠")
        );
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let output = narrator
        .convert(&cli.input)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    println!("{}", output.audio_path.display());

    if !cli.quiet {
        if let Some(ref url) = output.audio_url {
            eprintln!("   {}", dim(url));
        }
        eprintln!(
            "{}  {} voice {}  ·  {} words  ~{:.1} min  ·  {}ms  →  {}",
            if output.speech_tier == Tier::Primary {
                green("✔")
            } else {
                cyan("⚠")
            },
            bold(output.role.as_str()),
            dim(&output.voice_id),
            output.stats.narration_words,
            output.stats.estimated_minutes,
            output.stats.total_duration_ms,
            bold(&output.text_path.display().to_string()),
        );
        if output.stats.degraded_pages > 0 {
            eprintln!("   {} pages had no text", output.stats.degraded_pages);
        }
    }

    Ok(())
}

/// Print the sanitized text on stdout and the inferred voice on stderr.
async fn run_sanitize_only(cli: &Cli) -> Result<()> {
    let raw = if cli.input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(&cli.input)
            .await
            .with_context(|| format!("Failed to read {:?}", cli.input))?
    };

    let clean = sanitize(&raw);
    let role = classify(&clean);

    if cli.json {
        let report = serde_json::json!({
            "text": clean,
            "role": role,
            "voice_id": voice_for(role).voice_id,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise output")?
        );
    } else {
        println!("{clean}");
        if !cli.quiet {
            eprintln!("{} {}", dim("voice:"), voice_for(role).voice_id);
        }
    }
    Ok(())
}

/// Map CLI args to `NarrationConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<NarrationConfig> {
    let mut builder = NarrationConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .ocr_language(cli.ocr_lang.clone())
        .speech_language(cli.speech_lang.clone())
        .prosody(cli.rate.clone(), cli.pitch.clone())
        .output_dir(cli.output_dir.clone());

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref prefix) = cli.public_url {
        builder = builder.public_url_prefix(prefix.clone());
    }
    if let Some(ref path) = cli.tesseract {
        builder = builder.tesseract_path(path.clone());
    }
    if let (Some(key), Some(region)) = (&cli.azure_key, &cli.azure_region) {
        builder = builder.azure_speech(key.clone(), region.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
