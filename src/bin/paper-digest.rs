//! CLI binary for paper-digest.
//!
//! A thin shim over the library crate: maps CLI flags to `PipelineConfig`,
//! runs one paper into a directory-backed store and reports the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_digest::{
    inspect, resolve_provider, run_pipeline, ArtifactStore, Credentials, FsArtifactStore,
    PipelineConfig, PipelineProgressCallback, ProgressCallback, Stage,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner naming the running stage, one log line per
/// finished stage and per failed asset.
struct CliProgressCallback {
    bar: ProgressBar,
    stage_started: std::sync::Mutex<Option<Instant>>,
    unit_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            stage_started: std::sync::Mutex::new(None),
            unit_errors: AtomicUsize::new(0),
        })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_pipeline_start(&self, paper_id: i64) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing paper {paper_id}…"))
        ));
    }

    fn on_stage_start(&self, stage: Stage) {
        if let Ok(mut started) = self.stage_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_prefix("Running");
        self.bar.set_message(stage.to_string());
    }

    fn on_stage_complete(&self, stage: Stage, units: usize) {
        let elapsed = self
            .stage_started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        self.bar.println(format!(
            "  {} {:<22} {:<12} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{units:>4} units")),
            dim(&format!("{elapsed:.1}s")),
        ));
    }

    fn on_unit_error(&self, stage: Stage, unit: &str, error: &str) {
        self.unit_errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {} {}  {}", red("✗"), stage, unit, red(&msg)));
    }

    fn on_pipeline_complete(&self, paper_id: i64, succeeded: bool) {
        self.bar.finish_and_clear();
        let skipped = self.unit_errors.load(Ordering::SeqCst);
        if succeeded {
            eprintln!(
                "{} paper {} completed{}",
                green("✔"),
                bold(&paper_id.to_string()),
                if skipped > 0 {
                    format!("  ({skipped} assets skipped)")
                } else {
                    String::new()
                }
            );
        } else {
            eprintln!("{} paper {} failed", red("✘"), bold(&paper_id.to_string()));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Digest a paper into ./papers/1/
  paper-digest paper.pdf

  # Choose the id, batch size and output root
  paper-digest --paper-id 42 --batch-size 5 --output-dir out paper.pdf

  # Use a specific model
  paper-digest --provider openai --model gpt-4.1-mini paper.pdf

  # Inspect PDF metadata (no API key needed)
  paper-digest --inspect-only paper.pdf

OUTPUT ({output-dir}/{paper-id}/):
  original.md          Original content with media references
  english_summary.md   Section-by-section summary
  translation.md       Full translation
  korean_summary.md    Translated summary
  status.json          processing / completed / failed
  assets/              Cropped figures, tables and equations
  analysis.json        Pipeline state dump (disable with --no-analysis)

ENVIRONMENT VARIABLES:
  UPSTAGE_API_KEY         Upstage layout-analysis key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Digest academic paper PDFs into summaries and translations.
#[derive(Parser, Debug)]
#[command(
    name = "paper-digest",
    version,
    about = "Digest academic paper PDFs into summaries and translations",
    long_about = "Run layout analysis on an academic paper PDF, then produce its original \
content as markdown, an English summary, a full translation and a translated summary. \
Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    pdf: PathBuf,

    /// Identifier of the paper record to update.
    #[arg(long, env = "PAPER_DIGEST_PAPER_ID", default_value_t = 1)]
    paper_id: i64,

    /// Pages per layout-analysis batch.
    #[arg(short, long, env = "PAPER_DIGEST_BATCH_SIZE", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..=100))]
    batch_size: u64,

    /// Root directory for per-paper output.
    #[arg(short, long, env = "PAPER_DIGEST_OUTPUT_DIR", default_value = "papers")]
    output_dir: PathBuf,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Upstage layout-analysis API key.
    #[arg(long, env = "UPSTAGE_API_KEY", hide_env_values = true)]
    layout_api_key: Option<String>,

    /// Layout-analysis endpoint.
    #[arg(long, env = "PAPER_DIGEST_LAYOUT_ENDPOINT")]
    layout_endpoint: Option<String>,

    /// Language of the translated documents.
    #[arg(long, env = "PAPER_DIGEST_LANGUAGE", default_value = "Korean")]
    language: String,

    /// Number of concurrent LLM calls.
    #[arg(short, long, env = "PAPER_DIGEST_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PAPER_DIGEST_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PAPER_DIGEST_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PAPER_DIGEST_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Do not write analysis.json.
    #[arg(long)]
    no_analysis: bool,

    /// Print the final status as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress output.
    #[arg(long, env = "PAPER_DIGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no processing.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPER_DIGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPER_DIGEST_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries the feedback that matters; library INFO logs
    // would only interleave with it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.pdf).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.pdf.display());
            if let Some(ref t) = info.title {
                println!("Title:        {}", t);
            }
            println!("Pages:        {}", info.page_count);
        }
        return Ok(());
    }

    // ── Credentials ──────────────────────────────────────────────────────
    let layout_api_key = cli
        .layout_api_key
        .clone()
        .filter(|k| !k.is_empty())
        .context("No layout-analysis key: pass --layout-api-key or set UPSTAGE_API_KEY")?;
    let llm = resolve_provider(cli.provider.as_deref(), cli.model.as_deref())
        .context("Failed to configure the LLM provider")?;
    let credentials = Credentials {
        layout_api_key,
        llm,
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let store = FsArtifactStore::new(&cli.output_dir);
    // Running the CLI on a paper id is a resubmission of that paper.
    store
        .resubmit(cli.paper_id)
        .await
        .context("Failed to reset the paper status")?;
    let start = Instant::now();
    let result = run_pipeline(
        &cli.pdf,
        cli.batch_size as usize,
        &credentials,
        cli.paper_id,
        &store,
        &config,
    )
    .await;

    if cli.json {
        let status = store
            .status(cli.paper_id)
            .await
            .context("Failed to read back paper status")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("Failed to serialise status")?
        );
    }

    let docs = result.context("Pipeline failed")?;
    if !cli.quiet && !cli.json {
        eprintln!(
            "{}  {}  {}ms",
            green("✔"),
            bold(&store.paper_dir(cli.paper_id).display().to_string()),
            start.elapsed().as_millis(),
        );
        eprintln!(
            "   {} original  /  {} summary  /  {} translation chars",
            dim(&docs.original.chars().count().to_string()),
            dim(&docs.english_summary.chars().count().to_string()),
            dim(&docs.translation.chars().count().to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .target_language(cli.language.clone())
        .output_dir(cli.output_dir.clone())
        .write_analysis(!cli.no_analysis);

    if let Some(ref endpoint) = cli.layout_endpoint {
        builder = builder.layout_endpoint(endpoint.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
