//! Structural elements recovered by layout analysis.
//!
//! Every element belongs to exactly one page and carries a bounding box in
//! page-local coordinates (top-left origin, same units as the page size the
//! analyzer reports). [`ElementKind`] decides which downstream transform, if
//! any, applies: only images, tables and equations are cropped and captioned;
//! only headings and text feed page text and summaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Document-wide element identifier, assigned in discovery order.
pub type ElementId = usize;

/// Axis-aligned rectangle in page-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Smallest box enclosing all points. `None` for an empty slice.
    pub fn from_points(points: &[(f32, f32)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self::new(first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            bbox.x0 = bbox.x0.min(x);
            bbox.y0 = bbox.y0.min(y);
            bbox.x1 = bbox.x1.max(x);
            bbox.y1 = bbox.y1.max(y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

/// Category-specific payload of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum ElementKind {
    Heading { text: String },
    Text { text: String },
    Image,
    Table { text: String },
    Equation { text: String },
    Caption { text: String },
    Footer { text: String },
    Reference { text: String },
}

impl ElementKind {
    /// Map an analyzer category label onto a kind.
    ///
    /// Unknown labels are treated as body text.
    pub fn from_category(category: &str, text: String) -> Self {
        match category.to_ascii_lowercase().as_str() {
            "heading1" | "heading" | "title" => ElementKind::Heading { text },
            "paragraph" | "list" | "index" | "text" => ElementKind::Text { text },
            "figure" | "chart" | "image" => ElementKind::Image,
            "table" => ElementKind::Table { text },
            "equation" => ElementKind::Equation { text },
            "caption" => ElementKind::Caption { text },
            "header" | "footer" | "footnote" => ElementKind::Footer { text },
            "reference" => ElementKind::Reference { text },
            other => {
                debug!("Unknown element category '{}', treating as text", other);
                ElementKind::Text { text }
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ElementKind::Heading { .. } => "heading",
            ElementKind::Text { .. } => "text",
            ElementKind::Image => "image",
            ElementKind::Table { .. } => "table",
            ElementKind::Equation { .. } => "equation",
            ElementKind::Caption { .. } => "caption",
            ElementKind::Footer { .. } => "footer",
            ElementKind::Reference { .. } => "reference",
        }
    }

    /// The element's plain text, if its category carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            ElementKind::Image => None,
            ElementKind::Heading { text }
            | ElementKind::Text { text }
            | ElementKind::Table { text }
            | ElementKind::Equation { text }
            | ElementKind::Caption { text }
            | ElementKind::Footer { text }
            | ElementKind::Reference { text } => Some(text),
        }
    }

    /// Which media asset this element produces, if any.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            ElementKind::Image => Some(MediaKind::Image),
            ElementKind::Table { .. } => Some(MediaKind::Table),
            ElementKind::Equation { .. } => Some(MediaKind::Equation),
            _ => None,
        }
    }
}

/// A single structural unit on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    /// Global 0-based page index.
    pub page: usize,
    pub bbox: BoundingBox,
    /// HTML fragment as returned by the analyzer.
    pub html: String,
    #[serde(flatten)]
    pub kind: ElementKind,
}

/// Page dimensions and the ids of the elements on it, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub page: usize,
    pub width: f32,
    pub height: f32,
    pub element_ids: Vec<ElementId>,
}

/// Element categories that are cropped into asset files and captioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Table,
    Equation,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Image, MediaKind::Table, MediaKind::Equation];
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Image => "image",
            MediaKind::Table => "table",
            MediaKind::Equation => "equation",
        })
    }
}

/// A cropped region written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub element_id: ElementId,
    pub page: usize,
    pub kind: MediaKind,
    /// Absolute location of the PNG.
    pub path: std::path::PathBuf,
    /// Location relative to the paper directory, as referenced from markdown.
    pub relative_path: String,
    /// Analyzer text for the element, passed along as caption context.
    pub context: Option<String>,
}

/// A generated caption paired with the asset it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaCaption {
    pub element_id: ElementId,
    pub page: usize,
    pub kind: MediaKind,
    pub relative_path: String,
    pub caption: String,
}

/// Deterministic asset file name for an element.
pub fn asset_file_name(kind: MediaKind, page: usize, element_id: ElementId) -> String {
    format!("{kind}_p{page:04}_e{element_id:04}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_from_points_encloses_all() {
        let bbox = BoundingBox::from_points(&[(10.0, 20.0), (110.0, 20.0), (110.0, 70.0), (10.0, 70.0)])
            .unwrap();
        assert_eq!(bbox, BoundingBox::new(10.0, 20.0, 110.0, 70.0));
        assert_eq!(bbox.width(), 100.0);
        assert_eq!(bbox.height(), 50.0);
        assert!(BoundingBox::from_points(&[]).is_none());
    }

    #[test]
    fn degenerate_bbox_is_empty() {
        assert!(BoundingBox::new(5.0, 5.0, 5.0, 40.0).is_empty());
        assert!(!BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn categories_map_to_kinds() {
        let t = || "x".to_string();
        assert!(matches!(ElementKind::from_category("heading1", t()), ElementKind::Heading { .. }));
        assert!(matches!(ElementKind::from_category("paragraph", t()), ElementKind::Text { .. }));
        assert!(matches!(ElementKind::from_category("figure", t()), ElementKind::Image));
        assert!(matches!(ElementKind::from_category("chart", t()), ElementKind::Image));
        assert!(matches!(ElementKind::from_category("Table", t()), ElementKind::Table { .. }));
        assert!(matches!(ElementKind::from_category("equation", t()), ElementKind::Equation { .. }));
        assert!(matches!(ElementKind::from_category("footer", t()), ElementKind::Footer { .. }));
        assert!(matches!(ElementKind::from_category("reference", t()), ElementKind::Reference { .. }));
        assert!(matches!(ElementKind::from_category("marginalia", t()), ElementKind::Text { .. }));
    }

    #[test]
    fn only_media_categories_have_media_kind() {
        assert_eq!(ElementKind::Image.media_kind(), Some(MediaKind::Image));
        assert_eq!(
            ElementKind::Equation { text: "E=mc^2".into() }.media_kind(),
            Some(MediaKind::Equation)
        );
        assert_eq!(ElementKind::Caption { text: "Fig 1".into() }.media_kind(), None);
        assert_eq!(ElementKind::Heading { text: "Intro".into() }.media_kind(), None);
    }

    #[test]
    fn asset_names_are_deterministic() {
        assert_eq!(asset_file_name(MediaKind::Table, 3, 42), "table_p0003_e0042.png");
        assert_eq!(
            asset_file_name(MediaKind::Equation, 0, 7),
            asset_file_name(MediaKind::Equation, 0, 7)
        );
    }

    #[test]
    fn element_serializes_with_category_tag() {
        let el = Element {
            id: 1,
            page: 0,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            html: "<h1>Intro</h1>".into(),
            kind: ElementKind::Heading { text: "Intro".into() },
        };
        let json = serde_json::to_value(&el).unwrap();
        assert_eq!(json["category"], "heading");
        assert_eq!(json["text"], "Intro");
    }
}
