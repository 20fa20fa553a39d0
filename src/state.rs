//! Run-scoped pipeline state.
//!
//! One [`PipelineState`] is created per run and never shared between runs.
//! Stages read it by shared reference and return the data they produce; the
//! driver in [`crate::run`] writes that data back and records the stage as
//! completed. A stage that finds one of its dependencies missing fails with
//! [`PaperError::StageOrder`] instead of reading half-populated fields.

use crate::element::{Element, ElementId, MediaAsset, MediaCaption, PageMetadata};
use crate::error::PaperError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Split,
    Layout,
    Extract,
    Sections,
    Crop,
    Text,
    PageSummaries,
    PaperSummary,
    SummaryTranslation,
    MediaCaptions,
    FullTranslation,
}

impl Stage {
    /// Stages that must have completed before this one may run.
    pub fn dependencies(self) -> &'static [Stage] {
        match self {
            Stage::Split => &[],
            Stage::Layout => &[Stage::Split],
            Stage::Extract => &[Stage::Layout],
            Stage::Sections => &[Stage::Extract],
            Stage::Crop => &[Stage::Extract],
            Stage::Text => &[Stage::Sections],
            Stage::PageSummaries => &[Stage::Text],
            Stage::PaperSummary => &[Stage::PageSummaries],
            Stage::SummaryTranslation => &[Stage::PaperSummary],
            Stage::MediaCaptions => &[Stage::Crop],
            Stage::FullTranslation => &[Stage::MediaCaptions, Stage::Sections],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Split => "pdf split",
            Stage::Layout => "layout analysis",
            Stage::Extract => "element extraction",
            Stage::Sections => "section naming",
            Stage::Crop => "media crop",
            Stage::Text => "text assembly",
            Stage::PageSummaries => "page summaries",
            Stage::PaperSummary => "paper summary",
            Stage::SummaryTranslation => "summary translation",
            Stage::MediaCaptions => "media captions",
            Stage::FullTranslation => "full translation",
        })
    }
}

/// One entry of the ordered HTML sequence behind the original-content document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlFragment {
    /// The element this fragment belongs to.
    pub element_id: ElementId,
    /// `true` for fragments the pipeline inserted (equation captions).
    pub generated: bool,
    pub html: String,
}

/// Translation of the original-content document, block by block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslatedDocument {
    /// Opening `# ` heading line, kept verbatim.
    pub head: String,
    pub blocks: Vec<String>,
}

/// The aggregate threaded through every stage of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub filepath: PathBuf,
    pub batch_size: usize,
    /// PDF metadata title, or the file stem.
    pub title: String,

    pub split_filepaths: Vec<PathBuf>,
    pub analyzed_files: Vec<PathBuf>,

    pub page_metadata: BTreeMap<usize, PageMetadata>,
    pub page_elements: BTreeMap<usize, Vec<Element>>,
    pub section_names: BTreeMap<usize, String>,
    pub html_content: Vec<HtmlFragment>,

    pub page_texts: BTreeMap<usize, String>,
    /// Whole-document text with section rules. Nothing downstream reads it;
    /// it is kept for the `analysis.json` dump.
    pub full_text: String,

    pub texts_summary: BTreeMap<usize, String>,
    pub texts_trans_summary: BTreeMap<usize, String>,
    pub paper_summary: Option<String>,
    pub paper_trans_summary: Option<String>,

    pub media_assets: Vec<MediaAsset>,
    pub image_summary_data_batches: Vec<MediaCaption>,
    pub table_summary_data_batches: Vec<MediaCaption>,
    pub equation_summary: BTreeMap<ElementId, String>,

    pub translation: TranslatedDocument,

    completed: BTreeSet<Stage>,
}

impl PipelineState {
    pub fn new(filepath: impl Into<PathBuf>, batch_size: usize, title: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            batch_size,
            title: title.into(),
            ..Default::default()
        }
    }

    /// Fail unless every dependency of `stage` has completed.
    pub fn require(&self, stage: Stage) -> Result<(), PaperError> {
        match stage
            .dependencies()
            .iter()
            .find(|dep| !self.completed.contains(dep))
        {
            Some(&missing) => Err(PaperError::StageOrder { stage, missing }),
            None => Ok(()),
        }
    }

    /// Fail unless `stage` itself has completed.
    pub fn require_completed(&self, consumer: Stage, stage: Stage) -> Result<(), PaperError> {
        if self.completed.contains(&stage) {
            Ok(())
        } else {
            Err(PaperError::StageOrder {
                stage: consumer,
                missing: stage,
            })
        }
    }

    pub fn mark_completed(&mut self, stage: Stage) {
        self.completed.insert(stage);
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    /// All elements in document order (page, then reading order).
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.page_elements.values().flatten()
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements().find(|e| e.id == id)
    }

    pub fn page_count(&self) -> usize {
        self.page_metadata.len()
    }

    /// Scratch files owned by this run.
    pub fn scratch_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.split_filepaths.iter().chain(self.analyzed_files.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_reports_first_missing_dependency() {
        let mut state = PipelineState::new("paper.pdf", 10, "Paper");
        let err = state.require(Stage::Extract).unwrap_err();
        assert!(matches!(
            err,
            PaperError::StageOrder {
                stage: Stage::Extract,
                missing: Stage::Layout
            }
        ));

        state.mark_completed(Stage::Split);
        state.mark_completed(Stage::Layout);
        assert!(state.require(Stage::Extract).is_ok());
    }

    #[test]
    fn full_translation_needs_captions_and_sections() {
        let mut state = PipelineState::new("paper.pdf", 10, "Paper");
        state.mark_completed(Stage::MediaCaptions);
        assert!(matches!(
            state.require(Stage::FullTranslation),
            Err(PaperError::StageOrder {
                missing: Stage::Sections,
                ..
            })
        ));
        state.mark_completed(Stage::Sections);
        assert!(state.require(Stage::FullTranslation).is_ok());
    }

    #[test]
    fn every_dependency_precedes_its_stage() {
        let all = [
            Stage::Split,
            Stage::Layout,
            Stage::Extract,
            Stage::Sections,
            Stage::Crop,
            Stage::Text,
            Stage::PageSummaries,
            Stage::PaperSummary,
            Stage::SummaryTranslation,
            Stage::MediaCaptions,
            Stage::FullTranslation,
        ];
        for stage in all {
            for dep in stage.dependencies() {
                assert!(dep < &stage, "{dep:?} must come before {stage:?}");
            }
        }
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = PipelineState::new("paper.pdf", 4, "Paper");
        state.section_names.insert(0, "Introduction".into());
        state.mark_completed(Stage::Split);
        let json = serde_json::to_string(&state).unwrap();
        let back: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.section_names.get(&0).map(String::as_str), Some("Introduction"));
        assert!(back.is_completed(Stage::Split));
    }
}
