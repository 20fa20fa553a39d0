//! Document assembly: the four markdown documents, as pure functions of a
//! finished [`PipelineState`].
//!
//! Nothing here calls out or touches the file system, so assembling the same
//! state twice yields byte-identical documents. Units missing from the state
//! (a page without a summary) are rendered as a placeholder, never as an
//! error.

use crate::element::{ElementKind, MediaCaption};
use crate::error::PaperError;
use crate::output::PaperDocuments;
use crate::pipeline::markdown::html_to_markdown;
use crate::pipeline::postprocess::finish_document;
use crate::pipeline::sections::is_page_excluded;
use crate::state::{PipelineState, Stage};
use std::collections::BTreeMap;

/// Shown in place of a summary that is missing from the state.
pub const MISSING_SUMMARY: &str = "*(summary unavailable)*";

/// Build all four documents.
pub fn assemble(state: &PipelineState) -> Result<PaperDocuments, PaperError> {
    for stage in [Stage::SummaryTranslation, Stage::FullTranslation] {
        if !state.is_completed(stage) {
            return Err(PaperError::AssemblyIncomplete { missing: stage });
        }
    }

    Ok(PaperDocuments {
        original: original_markdown(state)?,
        english_summary: summary_markdown(
            state,
            &state.texts_summary,
            state.paper_summary.as_deref(),
        ),
        translation: translation_markdown(state),
        korean_summary: summary_markdown(
            state,
            &state.texts_trans_summary,
            state.paper_trans_summary.as_deref(),
        ),
    })
}

/// The original-content document: every HTML fragment, in order, as markdown.
///
/// Images with a cropped asset become image references; generated equation
/// captions stay HTML so their id and category marker survive.
pub fn original_markdown(state: &PipelineState) -> Result<String, PaperError> {
    if !state.is_completed(Stage::MediaCaptions) {
        return Err(PaperError::AssemblyIncomplete {
            missing: Stage::MediaCaptions,
        });
    }

    let assets: BTreeMap<usize, &str> = state
        .media_assets
        .iter()
        .map(|a| (a.element_id, a.relative_path.as_str()))
        .collect();
    let image_captions: BTreeMap<usize, &str> = state
        .image_summary_data_batches
        .iter()
        .map(|c| (c.element_id, c.caption.as_str()))
        .collect();

    let mut blocks = Vec::with_capacity(state.html_content.len());
    for fragment in &state.html_content {
        if fragment.generated {
            blocks.push(fragment.html.clone());
            continue;
        }
        let is_image = state
            .element(fragment.element_id)
            .is_some_and(|e| e.kind == ElementKind::Image);
        let block = match (is_image, assets.get(&fragment.element_id)) {
            (true, Some(path)) => {
                let alt = image_captions
                    .get(&fragment.element_id)
                    .map(|c| single_line(c))
                    .unwrap_or_else(|| "image".to_string());
                format!("![{}]({})", alt, path)
            }
            _ => html_to_markdown(&fragment.html),
        };
        if !block.is_empty() {
            blocks.push(block);
        }
    }

    Ok(finish_document(&blocks.join("\n\n")))
}

/// A summary document: one entry per included page, in page order.
///
/// Pages in an excluded section (References) or holding only reference
/// entries are skipped. Every included page opens with its section heading,
/// so pages sharing a section repeat it. The first included page shows the
/// paper summary instead of its own. Image and table captions of a page follow its summary.
pub fn summary_markdown(
    state: &PipelineState,
    page_summaries: &BTreeMap<usize, String>,
    paper_summary: Option<&str>,
) -> String {
    let mut captions: BTreeMap<usize, Vec<&MediaCaption>> = BTreeMap::new();
    for caption in state
        .image_summary_data_batches
        .iter()
        .chain(&state.table_summary_data_batches)
    {
        captions.entry(caption.page).or_default().push(caption);
    }
    for list in captions.values_mut() {
        list.sort_by_key(|c| c.element_id);
    }

    let mut out: Vec<String> = Vec::new();
    let mut first = true;

    for &page in state.page_metadata.keys() {
        let elements = state
            .page_elements
            .get(&page)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let section = state.section_names.get(&page).map(String::as_str);
        if is_page_excluded(section, elements) {
            continue;
        }

        let has_text = state
            .page_texts
            .get(&page)
            .is_some_and(|t| !t.trim().is_empty());
        let page_captions = captions.get(&page).map(Vec::as_slice).unwrap_or_default();
        if !has_text && page_captions.is_empty() {
            continue;
        }

        if let Some(name) = section.map(str::trim).filter(|s| !s.is_empty()) {
            out.push(format!("# {}", name));
        }

        let summary = if first {
            Some(paper_summary.filter(|s| !s.trim().is_empty()).unwrap_or(MISSING_SUMMARY))
        } else if has_text {
            Some(
                page_summaries
                    .get(&page)
                    .map(String::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(MISSING_SUMMARY),
            )
        } else {
            None
        };
        if let Some(summary) = summary {
            out.push(summary.trim().to_string());
        }
        first = false;

        for caption in page_captions {
            out.push(format!(
                "![{}]({})",
                single_line(&caption.caption),
                caption.relative_path
            ));
        }
    }

    finish_document(&out.join("\n\n"))
}

/// The translated document: the opening heading, then every translated block.
pub fn translation_markdown(state: &PipelineState) -> String {
    let doc = &state.translation;
    let parts: Vec<&str> = std::iter::once(doc.head.as_str())
        .chain(doc.blocks.iter().map(String::as_str))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    finish_document(&parts.join("\n\n"))
}

/// Caption text usable as image alt text.
fn single_line(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('[', "(")
        .replace(']', ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{BoundingBox, Element, MediaAsset, MediaKind, PageMetadata};
    use crate::state::{HtmlFragment, TranslatedDocument};
    use std::path::PathBuf;

    fn el(id: usize, page: usize, kind: ElementKind, html: &str) -> Element {
        Element {
            id,
            page,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            html: html.into(),
            kind,
        }
    }

    /// Three pages: Introduction (with a figure), a page inheriting it, and References.
    fn finished_state() -> PipelineState {
        let mut state = PipelineState::new("paper.pdf", 10, "Paper");
        let pages = vec![
            vec![
                el(0, 0, ElementKind::Heading { text: "Introduction".into() }, "<h1>Introduction</h1>"),
                el(1, 0, ElementKind::Text { text: "alpha".into() }, "<p>alpha</p>"),
                el(2, 0, ElementKind::Image, "<figure><img></figure>"),
            ],
            vec![
                el(3, 1, ElementKind::Text { text: "beta".into() }, "<p>beta</p>"),
                el(4, 1, ElementKind::Equation { text: "E=mc^2".into() }, "<p>E=mc^2</p>"),
            ],
            vec![
                el(5, 2, ElementKind::Heading { text: "References".into() }, "<h1>References</h1>"),
                el(6, 2, ElementKind::Text { text: "gamma".into() }, "<p>gamma</p>"),
            ],
        ];
        for (page, elements) in pages.into_iter().enumerate() {
            state.page_metadata.insert(
                page,
                PageMetadata {
                    page,
                    width: 100.0,
                    height: 100.0,
                    element_ids: elements.iter().map(|e| e.id).collect(),
                },
            );
            for e in &elements {
                state.html_content.push(HtmlFragment {
                    element_id: e.id,
                    generated: false,
                    html: e.html.clone(),
                });
            }
            state.page_elements.insert(page, elements);
        }
        state.html_content.insert(
            5,
            HtmlFragment {
                element_id: 4,
                generated: true,
                html: "<p id='4_1' data-category='equation' style='font-size:14px'>energy</p>".into(),
            },
        );
        state.section_names = BTreeMap::from([
            (0, "Introduction".to_string()),
            (1, "Introduction".to_string()),
            (2, "References".to_string()),
        ]);
        state.page_texts = BTreeMap::from([
            (0, "# Introduction\nalpha".to_string()),
            (1, "beta".to_string()),
            (2, "# References\ngamma".to_string()),
        ]);
        state.texts_summary = BTreeMap::from([(0, "sum alpha".to_string()), (1, "sum beta".to_string())]);
        state.texts_trans_summary = BTreeMap::from([(0, "요약 alpha".to_string()), (1, "요약 beta".to_string())]);
        state.paper_summary = Some("whole paper".into());
        state.paper_trans_summary = Some("논문 전체".into());
        state.media_assets = vec![MediaAsset {
            element_id: 2,
            page: 0,
            kind: MediaKind::Image,
            path: PathBuf::from("/tmp/papers/1/assets/image_p0000_e0002.png"),
            relative_path: "assets/image_p0000_e0002.png".into(),
            context: None,
        }];
        state.image_summary_data_batches = vec![MediaCaption {
            element_id: 2,
            page: 0,
            kind: MediaKind::Image,
            relative_path: "assets/image_p0000_e0002.png".into(),
            caption: "A diagram\nof [the] model".into(),
        }];
        state.translation = TranslatedDocument {
            head: "# Paper".into(),
            blocks: vec!["# Introduction\n번역".into()],
        };
        for stage in [
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
        ] {
            state.mark_completed(stage);
        }
        state
    }

    #[test]
    fn original_contains_every_page_in_order() {
        let doc = original_markdown(&finished_state()).unwrap();
        assert_eq!(
            doc,
            "# Introduction\n\nalpha\n\n![A diagram of (the) model](assets/image_p0000_e0002.png)\n\n\
             beta\n\nE=mc^2\n\n\
             <p id='4_1' data-category='equation' style='font-size:14px'>energy</p>\n\n\
             # References\n\ngamma\n"
        );
    }

    #[test]
    fn english_summary_skips_references_and_uses_paper_summary_first() {
        let doc = summary_markdown(
            &finished_state(),
            &finished_state().texts_summary,
            Some("whole paper"),
        );
        assert_eq!(
            doc,
            "# Introduction\n\nwhole paper\n\n\
             ![A diagram of (the) model](assets/image_p0000_e0002.png)\n\n\
             # Introduction\n\nsum beta\n"
        );
        assert!(!doc.contains("References"));
        assert!(!doc.contains("gamma"));
    }

    #[test]
    fn every_included_page_repeats_its_section_heading() {
        let state = finished_state();
        let doc = summary_markdown(&state, &state.texts_summary, Some("whole paper"));
        assert_eq!(doc.matches("# Introduction").count(), 2);
    }

    #[test]
    fn missing_summaries_become_placeholders() {
        let mut state = finished_state();
        state.texts_summary.clear();
        state.paper_summary = None;
        let doc = summary_markdown(&state, &state.texts_summary, state.paper_summary.as_deref());
        assert_eq!(doc.matches(MISSING_SUMMARY).count(), 2);
    }

    #[test]
    fn assemble_is_idempotent() {
        let state = finished_state();
        let a = assemble(&state).unwrap();
        let b = assemble(&state).unwrap();
        assert_eq!(a, b);
        assert!(a.korean_summary.contains("논문 전체"));
        assert_eq!(a.translation, "# Paper\n\n# Introduction\n번역\n");
    }

    #[test]
    fn assemble_requires_finished_stages() {
        let state = PipelineState::new("paper.pdf", 10, "Paper");
        assert!(matches!(
            assemble(&state),
            Err(PaperError::AssemblyIncomplete { .. })
        ));
        assert!(matches!(
            original_markdown(&state),
            Err(PaperError::AssemblyIncomplete {
                missing: Stage::MediaCaptions
            })
        ));
    }
}
