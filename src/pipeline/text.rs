//! Text assembly: page text from headings and body text, and the
//! whole-document text grouped by section.

use crate::element::{Element, ElementKind};
use std::collections::BTreeMap;

/// Text of one page: headings as `# text`, body text verbatim, in reading
/// order, one element per line. Media, captions, footers and reference
/// entries are left out.
pub fn page_text(elements: &[Element]) -> String {
    elements
        .iter()
        .filter_map(|e| match &e.kind {
            ElementKind::Heading { text } if !text.trim().is_empty() => {
                Some(format!("# {}", text.trim()))
            }
            ElementKind::Text { text } if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Page texts for every page in `elements`, including empty ones.
pub fn page_texts(elements: &BTreeMap<usize, Vec<Element>>) -> BTreeMap<usize, String> {
    elements
        .iter()
        .map(|(&page, els)| (page, page_text(els)))
        .collect()
}

/// All page texts in page order, with a blank line between pages and a
/// horizontal rule wherever the section name changes.
pub fn full_text(page_texts: &BTreeMap<usize, String>, sections: &BTreeMap<usize, String>) -> String {
    let mut out = String::new();
    let mut previous: Option<&str> = None;

    for (page, text) in page_texts {
        if text.is_empty() {
            continue;
        }
        let section = sections.get(page).map(String::as_str);
        if !out.is_empty() {
            if previous.is_some() && section != previous {
                out.push_str("\n\n---\n\n");
            } else {
                out.push_str("\n\n");
            }
        }
        out.push_str(text);
        previous = section;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::BoundingBox;

    fn el(id: usize, kind: ElementKind) -> Element {
        Element {
            id,
            page: 0,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            html: String::new(),
            kind,
        }
    }

    #[test]
    fn page_text_keeps_headings_and_body_only() {
        let elements = vec![
            el(0, ElementKind::Heading { text: "Introduction".into() }),
            el(1, ElementKind::Text { text: " Transformers are great. ".into() }),
            el(2, ElementKind::Image),
            el(3, ElementKind::Caption { text: "Figure 1".into() }),
            el(4, ElementKind::Equation { text: "x^2".into() }),
            el(5, ElementKind::Footer { text: "3".into() }),
            el(6, ElementKind::Text { text: "Second paragraph.".into() }),
        ];
        assert_eq!(
            page_text(&elements),
            "# Introduction\nTransformers are great.\nSecond paragraph."
        );
    }

    #[test]
    fn empty_page_has_empty_text() {
        assert_eq!(page_text(&[el(0, ElementKind::Image)]), "");
    }

    #[test]
    fn full_text_marks_section_boundaries() {
        let texts = BTreeMap::from([
            (0, "# Intro\na".to_string()),
            (1, "b".to_string()),
            (2, String::new()),
            (3, "# Method\nc".to_string()),
        ]);
        let sections = BTreeMap::from([
            (0, "Intro".to_string()),
            (1, "Intro".to_string()),
            (2, "Intro".to_string()),
            (3, "Method".to_string()),
        ]);
        assert_eq!(full_text(&texts, &sections), "# Intro\na\n\nb\n\n---\n\n# Method\nc");
    }
}
