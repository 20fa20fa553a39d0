//! Pipeline driver: one invocation takes one uploaded paper from
//! `processing` to `completed` or `failed`.
//!
//! [`run_pipeline`] builds the default collaborators (pdfium, the Upstage
//! layout service, an `edgequake_llm` provider) from per-invocation
//! [`Credentials`]. [`run_with`] takes them ready-made, which is how the
//! tests drive the pipeline without network or pdfium, and hands back the
//! final [`PipelineState`] next to the outcome.

use crate::config::PipelineConfig;
use crate::error::{PaperError, UnitError};
use crate::output::{ArtifactStore, PaperDocuments, PaperId, PaperUpdate};
use crate::pipeline::crop::ASSET_DIR;
use crate::pipeline::layout::{LayoutAnalyzer, UpstageLayoutAnalyzer};
use crate::pipeline::llm::{LlmTransform, TextTransform};
use crate::pipeline::render::{PdfBackend, PdfInfo, PdfiumBackend};
use crate::pipeline::{
    assemble, crop, extract, input, layout, media, render, sections, split, summary, text,
    translate,
};
use crate::progress::PipelineProgressCallback;
use crate::state::{PipelineState, Stage};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Name of the state dump written next to the assets.
pub const ANALYSIS_FILE: &str = "analysis.json";

/// Keys for one invocation. Never stored in [`PipelineConfig`].
#[derive(Clone)]
pub struct Credentials {
    pub layout_api_key: String,
    pub llm: Arc<dyn LLMProvider>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("layout_api_key", &"<redacted>")
            .field("llm", &"<dyn LLMProvider>")
            .finish()
    }
}

/// The collaborators a run talks to.
#[derive(Clone)]
pub struct PipelineContext {
    pub backend: Arc<dyn PdfBackend>,
    pub analyzer: Arc<dyn LayoutAnalyzer>,
    pub transform: Arc<dyn TextTransform>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    /// Default collaborators: pdfium, Upstage layout analysis, and the
    /// credentials' chat provider.
    pub fn from_credentials(
        credentials: &Credentials,
        config: &PipelineConfig,
    ) -> Result<Self, PaperError> {
        let analyzer = UpstageLayoutAnalyzer::new(
            credentials.layout_api_key.clone(),
            config.layout_endpoint.clone(),
            config.layout_timeout_secs,
        )?;
        Ok(Self {
            backend: Arc::new(PdfiumBackend),
            analyzer: Arc::new(analyzer),
            transform: Arc::new(LlmTransform::new(Arc::clone(&credentials.llm), config)),
            config: config.clone(),
        })
    }
}

/// A finished run: the state as the last stage left it, and the outcome.
#[derive(Debug)]
pub struct PipelineRun {
    pub state: PipelineState,
    pub outcome: Result<PaperDocuments, PaperError>,
}

/// Process one uploaded paper with the default collaborators.
///
/// The paper's status is moved to `processing` first and to `completed`
/// (with its four documents) or `failed` (with the error message) last.
///
/// # Errors
/// The fatal error that stopped the run; it has already been recorded on
/// the paper.
pub async fn run_pipeline(
    pdf_path: impl AsRef<Path>,
    batch_size: usize,
    credentials: &Credentials,
    paper_id: PaperId,
    store: &dyn ArtifactStore,
    config: &PipelineConfig,
) -> Result<PaperDocuments, PaperError> {
    let context = match PipelineContext::from_credentials(credentials, config) {
        Ok(context) => context,
        Err(e) => {
            error!("Paper {}: cannot build pipeline: {}", paper_id, e);
            if store.update(paper_id, PaperUpdate::processing()).await.is_ok() {
                record_failure(store, paper_id, &e).await;
            }
            return Err(e);
        }
    };
    run_with(&context, pdf_path.as_ref(), batch_size, paper_id, store)
        .await
        .outcome
}

/// Start [`run_pipeline`] on the tokio runtime and return immediately.
pub fn spawn_pipeline(
    pdf_path: PathBuf,
    batch_size: usize,
    credentials: Credentials,
    paper_id: PaperId,
    store: Arc<dyn ArtifactStore>,
    config: PipelineConfig,
) -> tokio::task::JoinHandle<Result<PaperDocuments, PaperError>> {
    tokio::spawn(async move {
        let run: std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<PaperDocuments, PaperError>> + Send + '_>,
        > = Box::pin(run_pipeline(
            &pdf_path,
            batch_size,
            &credentials,
            paper_id,
            store.as_ref(),
            &config,
        ));
        run.await
    })
}

/// Process one uploaded paper with caller-supplied collaborators.
pub async fn run_with(
    context: &PipelineContext,
    pdf_path: &Path,
    batch_size: usize,
    paper_id: PaperId,
    store: &dyn ArtifactStore,
) -> PipelineRun {
    let start = Instant::now();
    let events = Events(context.config.progress_callback.as_deref());
    info!("Paper {}: processing {}", paper_id, pdf_path.display());
    events.pipeline_start(paper_id);

    let mut state = PipelineState::new(pdf_path, batch_size, split::file_stem(pdf_path));

    let mut outcome = match store.update(paper_id, PaperUpdate::processing()).await {
        Ok(()) => execute(context, &mut state, paper_id, &events).await,
        Err(e) => Err(e),
    };

    if let Ok(documents) = &outcome {
        if let Err(e) = store
            .update(paper_id, PaperUpdate::completed(documents.clone()))
            .await
        {
            outcome = Err(e);
        }
    }

    match &outcome {
        Ok(_) => {
            info!(
                "Paper {}: completed in {}ms",
                paper_id,
                start.elapsed().as_millis()
            );
            if context.config.remove_source_on_success {
                if let Err(e) = tokio::fs::remove_file(&state.filepath).await {
                    warn!("Could not remove source {}: {}", state.filepath.display(), e);
                }
            }
        }
        Err(e) => {
            error!("Paper {}: failed: {}", paper_id, e);
            record_failure(store, paper_id, e).await;
        }
    }

    events.pipeline_complete(paper_id, outcome.is_ok());
    PipelineRun { state, outcome }
}

/// Page count and title of a PDF, without any external call.
pub async fn inspect(pdf_path: impl AsRef<Path>) -> Result<PdfInfo, PaperError> {
    let pdf = input::validate_pdf(pdf_path.as_ref())?;
    let mut info = render::pdf_info(Arc::new(PdfiumBackend), &pdf).await?;
    if info.title.is_none() {
        info.title = Some(split::file_stem(&pdf));
    }
    Ok(info)
}

async fn record_failure(store: &dyn ArtifactStore, paper_id: PaperId, e: &PaperError) {
    if let Err(persist) = store
        .update(paper_id, PaperUpdate::failed(e.to_string()))
        .await
    {
        error!("Paper {}: could not record failure: {}", paper_id, persist);
    }
}

// ── Stages ───────────────────────────────────────────────────────────────

async fn execute(
    context: &PipelineContext,
    state: &mut PipelineState,
    paper_id: PaperId,
    events: &Events<'_>,
) -> Result<PaperDocuments, PaperError> {
    // ── Step 1: Validate input ───────────────────────────────────────────
    let pdf = input::validate_pdf(&state.filepath)?;

    // ── Step 2: Private scratch directory ────────────────────────────────
    let mut builder = tempfile::Builder::new();
    builder.prefix("paper-digest-");
    let scratch = match &context.config.scratch_dir {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    }
    .map_err(|e| {
        PaperError::io(
            context
                .config
                .scratch_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            e,
        )
    })?;
    debug!("Scratch directory: {}", scratch.path().display());

    let result = run_stages(context, state, &pdf, scratch.path(), paper_id, events).await;

    remove_scratch_files(state).await;
    if let Err(e) = scratch.close() {
        warn!("Could not remove scratch directory: {}", e);
    }
    result
}

async fn run_stages(
    context: &PipelineContext,
    state: &mut PipelineState,
    pdf: &Path,
    scratch: &Path,
    paper_id: PaperId,
    events: &Events<'_>,
) -> Result<PaperDocuments, PaperError> {
    let config = &context.config;
    let stem = split::file_stem(pdf);

    // ── Step 3: Split into batches ───────────────────────────────────────
    events.begin(state, Stage::Split)?;
    let info = render::pdf_info(Arc::clone(&context.backend), pdf).await?;
    if let Some(title) = info.title {
        state.title = title;
    }
    state.split_filepaths = split::split_pdf(
        Arc::clone(&context.backend),
        pdf,
        info.page_count,
        state.batch_size,
        scratch,
    )
    .await?;
    let units = state.split_filepaths.len();
    events.end(state, Stage::Split, units);

    // ── Step 4: Layout analysis ──────────────────────────────────────────
    events.begin(state, Stage::Layout)?;
    state.analyzed_files = layout::analyze_batches(
        Arc::clone(&context.analyzer),
        &state.split_filepaths,
        &stem,
        scratch,
        config.concurrency,
    )
    .await?;
    let units = state.analyzed_files.len();
    events.end(state, Stage::Layout, units);

    // ── Step 5: Element extraction ───────────────────────────────────────
    events.begin(state, Stage::Extract)?;
    let responses = extract::read_responses(&state.analyzed_files).await?;
    let extracted = extract::extract_layout(&responses, state.batch_size)?;
    state.page_metadata = extracted.page_metadata;
    state.page_elements = extracted.page_elements;
    state.html_content = extracted.html_content;
    let units = state.elements().count();
    events.end(state, Stage::Extract, units);

    // ── Step 6: Section naming ───────────────────────────────────────────
    events.begin(state, Stage::Sections)?;
    state.section_names =
        sections::name_sections(&state.page_metadata, &state.page_elements, &state.title);
    let units = state.section_names.len();
    events.end(state, Stage::Sections, units);

    // ── Step 7: Media crop ───────────────────────────────────────────────
    events.begin(state, Stage::Crop)?;
    let asset_dir = config.paper_dir(paper_id).join(ASSET_DIR);
    let (assets, crop_errors) = crop::crop_media(
        Arc::clone(&context.backend),
        pdf,
        &state.page_metadata,
        &state.page_elements,
        &asset_dir,
        config.max_rendered_pixels,
    )
    .await?;
    events.unit_errors(Stage::Crop, &crop_errors);
    state.media_assets = assets;
    let units = state.media_assets.len();
    events.end(state, Stage::Crop, units);

    // ── Step 8: Text assembly ────────────────────────────────────────────
    events.begin(state, Stage::Text)?;
    state.page_texts = text::page_texts(&state.page_elements);
    state.full_text = text::full_text(&state.page_texts, &state.section_names);
    let units = state.page_texts.len();
    events.end(state, Stage::Text, units);

    // ── Step 9: Page summaries (map) ─────────────────────────────────────
    events.begin(state, Stage::PageSummaries)?;
    let pages = summarizable_pages(state);
    debug!("{} of {} pages to summarize", pages.len(), state.page_count());
    state.texts_summary = summary::summarize_pages(
        Arc::clone(&context.transform),
        pages,
        &config.prompts.page_summary,
        config.concurrency,
    )
    .await?;
    let units = state.texts_summary.len();
    events.end(state, Stage::PageSummaries, units);

    // ── Step 10: Paper summary (reduce) ──────────────────────────────────
    events.begin(state, Stage::PaperSummary)?;
    let paper_summary = summary::reduce_summaries(
        Arc::clone(&context.transform),
        &state.texts_summary,
        &config.prompts.paper_summary,
        config.reduce_input_limit,
        config.concurrency,
    )
    .await?;
    state.paper_summary = Some(paper_summary);
    events.end(state, Stage::PaperSummary, 1);

    // ── Step 11: Summary translation ─────────────────────────────────────
    events.begin(state, Stage::SummaryTranslation)?;
    let instruction = config.prompts.translation_for(&config.target_language);
    state.texts_trans_summary = translate::translate_summaries(
        Arc::clone(&context.transform),
        &state.texts_summary,
        &instruction,
        config.concurrency,
    )
    .await?;
    let paper_summary = state.paper_summary.clone().unwrap_or_default();
    state.paper_trans_summary = Some(
        translate::translate_one(
            &context.transform,
            &paper_summary,
            &instruction,
            Stage::SummaryTranslation,
            "paper summary",
        )
        .await?,
    );
    let units = state.texts_trans_summary.len() + 1;
    events.end(state, Stage::SummaryTranslation, units);

    // ── Step 12: Media captions ──────────────────────────────────────────
    events.begin(state, Stage::MediaCaptions)?;
    let captions = media::caption_media(
        Arc::clone(&context.transform),
        &state.media_assets,
        &config.prompts,
        config.media_batch_size,
    )
    .await;
    events.unit_errors(Stage::MediaCaptions, &captions.errors);
    state.image_summary_data_batches = captions.images;
    state.table_summary_data_batches = captions.tables;
    state.equation_summary = captions.equations;
    state.html_content = media::merge_equation_captions(&state.html_content, &state.equation_summary);
    let units = state.image_summary_data_batches.len()
        + state.table_summary_data_batches.len()
        + state.equation_summary.len();
    events.end(state, Stage::MediaCaptions, units);

    // ── Step 13: Full translation ────────────────────────────────────────
    events.begin(state, Stage::FullTranslation)?;
    let original = assemble::original_markdown(state)?;
    state.translation = translate::translate_document(
        Arc::clone(&context.transform),
        &original,
        &instruction,
        config.translation_chunk_chars,
        config.concurrency,
    )
    .await?;
    let units = state.translation.blocks.len();
    events.end(state, Stage::FullTranslation, units);

    // ── Step 14: Assemble documents ──────────────────────────────────────
    let documents = assemble::assemble(state)?;

    // ── Step 15: Analysis dump ───────────────────────────────────────────
    if config.write_analysis {
        let path = config.paper_dir(paper_id).join(ANALYSIS_FILE);
        match serde_json::to_vec_pretty(&*state) {
            Ok(json) => {
                if let Err(e) = crate::output::write_atomic(&path, &json).await {
                    warn!("Could not write {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Could not serialise pipeline state: {}", e),
        }
    }

    Ok(documents)
}

/// Pages sent to the page summarizer: non-empty text outside excluded sections.
fn summarizable_pages(state: &PipelineState) -> Vec<(usize, String)> {
    state
        .page_texts
        .iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .filter(|(page, _)| {
            let elements = state
                .page_elements
                .get(*page)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let section = state.section_names.get(*page).map(String::as_str);
            !sections::is_page_excluded(section, elements)
        })
        .map(|(&page, text)| (page, text.clone()))
        .collect()
}

async fn remove_scratch_files(state: &PipelineState) {
    for path in state.scratch_files() {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove scratch file {}: {}", path.display(), e),
        }
    }
}

// ── Progress events ──────────────────────────────────────────────────────

struct Events<'a>(Option<&'a dyn PipelineProgressCallback>);

impl Events<'_> {
    fn pipeline_start(&self, paper_id: PaperId) {
        if let Some(cb) = self.0 {
            cb.on_pipeline_start(paper_id);
        }
    }

    fn pipeline_complete(&self, paper_id: PaperId, succeeded: bool) {
        if let Some(cb) = self.0 {
            cb.on_pipeline_complete(paper_id, succeeded);
        }
    }

    fn begin(&self, state: &PipelineState, stage: Stage) -> Result<(), PaperError> {
        state.require(stage)?;
        debug!("Stage '{}' starting", stage);
        if let Some(cb) = self.0 {
            cb.on_stage_start(stage);
        }
        Ok(())
    }

    fn end(&self, state: &mut PipelineState, stage: Stage, units: usize) {
        state.mark_completed(stage);
        info!("Stage '{}' complete ({} units)", stage, units);
        if let Some(cb) = self.0 {
            cb.on_stage_complete(stage, units);
        }
    }

    fn unit_errors(&self, stage: Stage, errors: &[UnitError]) {
        let Some(cb) = self.0 else { return };
        for e in errors {
            let (UnitError::CropFailed { page, element, .. }
            | UnitError::CaptionFailed { page, element, .. }) = e;
            cb.on_unit_error(stage, &format!("page {} element {}", page, element), &e.to_string());
        }
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Default chat model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Resolve the chat provider, from most-specific to least-specific:
///
/// 1. **Named provider + model** (`provider`, `model`), API key read from the
///    provider's usual environment variable.
/// 2. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 3. **OpenAI** when `OPENAI_API_KEY` is set.
/// 4. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, PaperError> {
    if let Some(name) = provider {
        return create_provider(name, model.unwrap_or(DEFAULT_MODEL));
    }

    if let (Ok(name), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !name.is_empty() && !env_model.is_empty() {
            return create_provider(&name, model.unwrap_or(&env_model));
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|key| !key.is_empty()) {
        return create_provider("openai", model.unwrap_or(DEFAULT_MODEL));
    }

    let (llm, _embedding) =
        ProviderFactory::from_env().map_err(|e| PaperError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PaperError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        PaperError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}
