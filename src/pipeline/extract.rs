//! Element extraction: turn the per-batch layout responses into one
//! document-wide set of pages and elements.
//!
//! Accepted response shape (fields not listed are ignored):
//!
//! ```json
//! {
//!   "elements": [
//!     { "id": 0, "page": 1, "category": "heading1",
//!       "bounding_box": [{"x": 72, "y": 90}, …],
//!       "html": "<h1>Introduction</h1>", "text": "Introduction" }
//!   ],
//!   "metadata": { "pages": [{ "page": 1, "width": 1224, "height": 1584 }] }
//! }
//! ```
//!
//! `page` is 1-based within the batch. Newer responses carry `content.html` /
//! `content.text` and relative `coordinates` (0..1) instead; both are accepted.

use crate::element::{BoundingBox, Element, ElementKind, PageMetadata};
use crate::error::PaperError;
use crate::pipeline::markdown::{escape_html, html_to_text};
use crate::state::HtmlFragment;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct LayoutResponse {
    #[serde(default)]
    elements: Vec<RawElement>,
    metadata: RawMetadata,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    pages: Vec<RawPage>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    page: usize,
    width: f32,
    height: f32,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    page: usize,
    category: String,
    #[serde(default)]
    bounding_box: Vec<RawPoint>,
    #[serde(default)]
    coordinates: Vec<RawPoint>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content: Option<RawContent>,
}

#[derive(Debug, Default, Deserialize)]
struct RawContent {
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RawPoint {
    x: f32,
    y: f32,
}

/// Everything element extraction writes into the pipeline state.
#[derive(Debug, Default)]
pub struct ExtractedLayout {
    pub page_metadata: BTreeMap<usize, PageMetadata>,
    pub page_elements: BTreeMap<usize, Vec<Element>>,
    pub html_content: Vec<HtmlFragment>,
}

/// Parse the responses (index = batch number) of a run split into batches of
/// `batch_size` pages.
pub fn extract_layout(responses: &[String], batch_size: usize) -> Result<ExtractedLayout, PaperError> {
    let mut sizes: BTreeMap<usize, (f32, f32)> = BTreeMap::new();
    let mut pending: BTreeMap<usize, Vec<(BoundingBox, String, ElementKind)>> = BTreeMap::new();

    for (batch, body) in responses.iter().enumerate() {
        let response: LayoutResponse =
            serde_json::from_str(body).map_err(|e| PaperError::MalformedLayout {
                batch,
                detail: e.to_string(),
            })?;

        let global = |local: usize| -> Result<usize, PaperError> {
            if local == 0 || local > batch_size {
                return Err(PaperError::MalformedLayout {
                    batch,
                    detail: format!("page {} outside batch of {}", local, batch_size),
                });
            }
            Ok(batch * batch_size + local - 1)
        };

        for page in &response.metadata.pages {
            let idx = global(page.page)?;
            sizes.insert(idx, (page.width, page.height));
            pending.entry(idx).or_default();
        }

        for raw in response.elements {
            let page = global(raw.page)?;
            let &(width, height) = sizes.get(&page).ok_or_else(|| PaperError::MalformedLayout {
                batch,
                detail: format!("element on page {} has no page metadata", raw.page),
            })?;
            let (bbox, html, kind) = convert_element(raw, width, height);
            pending.entry(page).or_default().push((bbox, html, kind));
        }
    }

    // Ids follow document order: page first, then reading order on the page.
    let mut layout = ExtractedLayout::default();
    let mut next_id = 0;
    for (page, raws) in pending {
        let (width, height) = sizes.get(&page).copied().unwrap_or_default();
        let mut elements = Vec::with_capacity(raws.len());
        for (bbox, html, kind) in raws {
            layout.html_content.push(HtmlFragment {
                element_id: next_id,
                generated: false,
                html: html.clone(),
            });
            elements.push(Element {
                id: next_id,
                page,
                bbox,
                html,
                kind,
            });
            next_id += 1;
        }
        layout.page_metadata.insert(
            page,
            PageMetadata {
                page,
                width,
                height,
                element_ids: elements.iter().map(|e| e.id).collect(),
            },
        );
        layout.page_elements.insert(page, elements);
    }

    info!(
        "Extracted {} elements on {} pages",
        next_id,
        layout.page_metadata.len()
    );
    Ok(layout)
}

fn convert_element(raw: RawElement, width: f32, height: f32) -> (BoundingBox, String, ElementKind) {
    let content = raw.content.unwrap_or_default();
    let html = raw
        .html
        .filter(|h| !h.trim().is_empty())
        .or(content.html.filter(|h| !h.trim().is_empty()))
        .unwrap_or_default();
    let text = raw
        .text
        .filter(|t| !t.trim().is_empty())
        .or(content.text.filter(|t| !t.trim().is_empty()))
        .unwrap_or_else(|| html_to_text(&html));
    let text = text.trim().to_string();

    let bbox = if !raw.bounding_box.is_empty() {
        points_to_bbox(&raw.bounding_box, 1.0, 1.0)
    } else {
        points_to_bbox(&raw.coordinates, width, height)
    };

    let html = if html.is_empty() && !text.is_empty() {
        format!("<p>{}</p>", escape_html(&text))
    } else {
        html
    };

    let kind = ElementKind::from_category(&raw.category, text);
    debug!("{} element at {:?}", kind.label(), bbox);
    (bbox, html, kind)
}

fn points_to_bbox(points: &[RawPoint], sx: f32, sy: f32) -> BoundingBox {
    let scaled: Vec<(f32, f32)> = points.iter().map(|p| (p.x * sx, p.y * sy)).collect();
    BoundingBox::from_points(&scaled).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0))
}

/// Read the response files written by the layout stage, in batch order.
pub async fn read_responses(paths: &[PathBuf]) -> Result<Vec<String>, PaperError> {
    let mut bodies = Vec::with_capacity(paths.len());
    for path in paths {
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PaperError::io(path, e))?;
        bodies.push(body);
    }
    Ok(bodies)
}
