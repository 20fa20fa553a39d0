//! Error types for the paper-digest library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`PaperError`] is **fatal**: the run cannot continue (bad input file,
//!   layout service unreachable, a summary call failed). Returned as
//!   `Err(PaperError)` from the run entry points and recorded on the paper as
//!   `failed(error)`.
//!
//! * [`TransformError`] is the outcome of one generative call. The engines turn
//!   it into a [`PaperError::Transform`] when the unit is load-bearing (page
//!   summaries, translations) or into a [`UnitError`] when it is not
//!   (media captions).
//!
//! * [`UnitError`] is **non-fatal**: one asset could not be cropped or
//!   captioned. It is logged, reported to the progress callback, and the asset
//!   is left out of the output.

use crate::state::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the paper-digest library.
#[derive(Debug, Error)]
pub enum PaperError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file name does not carry a `.pdf` extension.
    #[error("Only PDF files are accepted, got '{path}'")]
    UnsupportedFormat { path: PathBuf },

    /// The file exists but holds no bytes.
    #[error("PDF file is empty: '{path}'")]
    EmptyFile { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open the document.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The document opened but has no pages.
    #[error("PDF '{path}' has no pages")]
    NoPages { path: PathBuf },

    /// Writing a page batch to a new PDF failed.
    #[error("Failed to split pages {start}-{end} of '{path}': {detail}")]
    SplitFailed {
        path: PathBuf,
        start: usize,
        end: usize,
        detail: String,
    },

    /// pdfium could not render a page.
    #[error("Rendering failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    // ── Layout analysis errors ────────────────────────────────────────────
    /// The layout service returned an error or could not be reached.
    #[error("Layout analysis failed for batch {batch}: {detail}")]
    LayoutFailed { batch: usize, detail: String },

    /// The layout service rejected the call with HTTP 429.
    #[error("Layout analysis rate limited on batch {batch}")]
    LayoutRateLimited { batch: usize },

    /// The layout call exceeded its timeout.
    #[error("Layout analysis timed out after {secs}s on batch {batch}")]
    LayoutTimeout { batch: usize, secs: u64 },

    /// The layout response is missing fields or is not the expected shape.
    #[error("Malformed layout response for batch {batch}: {detail}")]
    MalformedLayout { batch: usize, detail: String },

    // ── Transform errors ──────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A generative call failed for a unit whose output is required.
    #[error("{stage} failed for {unit}: {source}")]
    Transform {
        stage: Stage,
        unit: String,
        #[source]
        source: TransformError,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A stage ran before the stage it depends on populated the state.
    #[error("Stage '{stage}' requires '{missing}' to run first")]
    StageOrder { stage: Stage, missing: Stage },

    /// Documents were requested from a state some stage never populated.
    #[error("Cannot assemble documents: '{missing}' has not run")]
    AssemblyIncomplete { missing: Stage },

    /// Scratch or asset I/O failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact store rejected an update.
    #[error("Failed to persist paper {paper_id}: {detail}")]
    Persistence { paper_id: i64, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaperError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PaperError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of a single failed generative call.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransformError {
    /// Provider answered with HTTP 429 or an equivalent quota error.
    #[error("rate limited: {detail}")]
    RateLimited { detail: String },

    /// The call did not return within the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider answered but the response is unusable (e.g. empty).
    #[error("malformed response: {detail}")]
    Malformed { detail: String },

    /// Any other provider failure.
    #[error("provider error: {detail}")]
    Provider { detail: String },
}

impl TransformError {
    /// Classify a provider error message.
    pub fn from_provider_message(message: impl Into<String>) -> Self {
        let detail = message.into();
        let lower = detail.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") || lower.contains("quota") {
            TransformError::RateLimited { detail }
        } else {
            TransformError::Provider { detail }
        }
    }
}

/// A non-fatal error for a single media asset.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// The region could not be cut out of the page rendering.
    #[error("element {element} on page {page}: crop failed: {detail}")]
    CropFailed {
        page: usize,
        element: usize,
        detail: String,
    },

    /// The caption call for this asset failed.
    #[error("element {element} on page {page}: caption failed: {source}")]
    CaptionFailed {
        page: usize,
        element: usize,
        source: TransformError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_error_classifies_rate_limits() {
        let e = TransformError::from_provider_message("HTTP 429 Too Many Requests");
        assert!(matches!(e, TransformError::RateLimited { .. }));

        let e = TransformError::from_provider_message("Rate limit reached for gpt-4o-mini");
        assert!(matches!(e, TransformError::RateLimited { .. }));

        let e = TransformError::from_provider_message("connection reset by peer");
        assert!(matches!(e, TransformError::Provider { .. }));
    }

    #[test]
    fn transform_failure_display_names_stage_and_unit() {
        let e = PaperError::Transform {
            stage: Stage::PaperSummary,
            unit: "reduce level 0".into(),
            source: TransformError::Timeout { secs: 120 },
        };
        let msg = e.to_string();
        assert!(msg.contains("paper summary"), "got: {msg}");
        assert!(msg.contains("reduce level 0"), "got: {msg}");
        assert!(msg.contains("120s"), "got: {msg}");
    }

    #[test]
    fn stage_order_display() {
        let e = PaperError::StageOrder {
            stage: Stage::Crop,
            missing: Stage::Extract,
        };
        assert_eq!(
            e.to_string(),
            "Stage 'media crop' requires 'element extraction' to run first"
        );
    }

    #[test]
    fn unit_error_display() {
        let e = UnitError::CaptionFailed {
            page: 2,
            element: 17,
            source: TransformError::Malformed {
                detail: "empty".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("element 17"));
        assert!(msg.contains("page 2"));
    }
}
