//! # paper-digest
//!
//! Turn an academic paper PDF into four markdown documents: the original
//! content, an English summary, a full translation, and a translated summary.
//!
//! ## Why layout analysis?
//!
//! Plain text extraction loses what makes a paper readable: which lines are
//! headings, where a figure sits, which block is an equation. This crate
//! sends page batches to a layout-analysis service, works on the typed
//! elements it returns, and only then hands text to a language model for
//! summaries, translations and captions.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Validate   readable, non-empty, `%PDF` magic
//!  ├─ 2. Split      page batches as standalone PDFs (pdfium)
//!  ├─ 3. Layout     one Upstage call per batch
//!  ├─ 4. Extract    pages, typed elements, ordered HTML
//!  ├─ 5. Sections   every page named after its nearest heading
//!  ├─ 6. Crop       figures, tables, equations → assets/*.png
//!  ├─ 7. Text       per-page text
//!  ├─ 8. Summarize  map (pages) → reduce (paper)
//!  ├─ 9. Translate  summaries
//!  ├─ 10. Caption   every cropped asset; equation captions woven into the HTML
//!  ├─ 11. Translate the original-content document
//!  └─ 12. Assemble  four markdown documents + status update
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper_digest::{resolve_provider, run_pipeline, Credentials, FsArtifactStore, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().output_dir("papers").build()?;
//!     let credentials = Credentials {
//!         layout_api_key: std::env::var("UPSTAGE_API_KEY")?,
//!         llm: resolve_provider(None, None)?,
//!     };
//!     let store = FsArtifactStore::new("papers");
//!     let docs = run_pipeline("paper.pdf", 10, &credentials, 1, &store, &config).await?;
//!     println!("{}", docs.english_summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper-digest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paper-digest = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod element;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use element::{BoundingBox, Element, ElementId, ElementKind, MediaAsset, MediaCaption, MediaKind, PageMetadata};
pub use error::{PaperError, TransformError, UnitError};
pub use output::{
    ArtifactStore, FsArtifactStore, MemoryArtifactStore, PaperDocuments, PaperId, PaperRecord,
    PaperStatus, PaperUpdate,
};
pub use pipeline::layout::{LayoutAnalyzer, UpstageLayoutAnalyzer};
pub use pipeline::llm::{LlmTransform, TextTransform, TransformRequest};
pub use pipeline::render::{PdfBackend, PdfInfo, PdfiumBackend};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use prompts::Prompts;
pub use run::{
    inspect, resolve_provider, run_pipeline, run_with, spawn_pipeline, Credentials,
    PipelineContext, PipelineRun,
};
pub use state::{HtmlFragment, PipelineState, Stage, TranslatedDocument};
