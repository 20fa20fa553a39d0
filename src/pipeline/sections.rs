//! Section naming: give every page the text of the nearest preceding heading.

use crate::element::{Element, ElementKind, PageMetadata};
use std::collections::BTreeMap;

/// Section names that are kept in the original document but left out of the
/// summary documents.
const EXCLUDED_SECTIONS: &[&str] = &["references", "bibliography"];

/// Name every page in `pages`.
///
/// Pages are scanned in index order. Each heading element updates the current
/// name, so a page with several headings is named after its last one; a page
/// without headings inherits the current name. Until the first heading the
/// current name is `title`, so page 0 always has one.
pub fn name_sections(
    pages: &BTreeMap<usize, PageMetadata>,
    elements: &BTreeMap<usize, Vec<Element>>,
    title: &str,
) -> BTreeMap<usize, String> {
    let mut current = title.trim().to_string();
    let mut names = BTreeMap::new();

    for &page in pages.keys() {
        for element in elements.get(&page).into_iter().flatten() {
            if let ElementKind::Heading { text } = &element.kind {
                let text = text.trim();
                if !text.is_empty() {
                    current = text.to_string();
                }
            }
        }
        names.insert(page, current.clone());
    }
    names
}

/// Whether a section is left out of the summary documents.
///
/// Matches ignore case and a leading section number ("7 References",
/// "8. Bibliography").
pub fn is_excluded(section: &str) -> bool {
    let name = section
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c.is_whitespace())
        .trim_end_matches(':')
        .to_lowercase();
    EXCLUDED_SECTIONS.contains(&name.as_str())
}

/// Whether a page's own content is nothing but reference entries.
pub fn is_reference_only(elements: &[Element]) -> bool {
    let mut has_reference = false;
    for element in elements {
        match element.kind {
            ElementKind::Reference { .. } => has_reference = true,
            ElementKind::Footer { .. } | ElementKind::Caption { .. } => {}
            _ => return false,
        }
    }
    has_reference
}

/// Whether a page is left out of the summary documents.
pub fn is_page_excluded(section: Option<&str>, elements: &[Element]) -> bool {
    section.is_some_and(is_excluded) || is_reference_only(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::BoundingBox;

    fn element(id: usize, page: usize, kind: ElementKind) -> Element {
        Element {
            id,
            page,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            html: String::new(),
            kind,
        }
    }

    fn heading(id: usize, page: usize, text: &str) -> Element {
        element(id, page, ElementKind::Heading { text: text.into() })
    }

    fn text(id: usize, page: usize) -> Element {
        element(id, page, ElementKind::Text { text: "body".into() })
    }

    fn fixture(pages: Vec<Vec<Element>>) -> (BTreeMap<usize, PageMetadata>, BTreeMap<usize, Vec<Element>>) {
        let mut meta = BTreeMap::new();
        let mut elements = BTreeMap::new();
        for (page, els) in pages.into_iter().enumerate() {
            meta.insert(
                page,
                PageMetadata {
                    page,
                    width: 100.0,
                    height: 100.0,
                    element_ids: els.iter().map(|e| e.id).collect(),
                },
            );
            elements.insert(page, els);
        }
        (meta, elements)
    }

    #[test]
    fn pages_inherit_previous_heading() {
        let (meta, elements) = fixture(vec![
            vec![heading(0, 0, "Introduction"), text(1, 0)],
            vec![text(2, 1)],
            vec![heading(3, 2, "References"), text(4, 2)],
        ]);
        let names = name_sections(&meta, &elements, "Attention Is All You Need");
        assert_eq!(names[&0], "Introduction");
        assert_eq!(names[&1], "Introduction");
        assert_eq!(names[&2], "References");
    }

    #[test]
    fn page_zero_falls_back_to_title() {
        let (meta, elements) = fixture(vec![vec![text(0, 0)], vec![heading(1, 1, "Method")]]);
        let names = name_sections(&meta, &elements, "My Paper");
        assert_eq!(names[&0], "My Paper");
        assert_eq!(names[&1], "Method");

        let names = name_sections(&meta, &elements, "");
        assert_eq!(names[&0], "");
    }

    #[test]
    fn last_heading_on_page_wins() {
        let (meta, elements) = fixture(vec![vec![
            heading(0, 0, "2 Background"),
            text(1, 0),
            heading(2, 0, "3 Model"),
            text(3, 0),
        ]]);
        assert_eq!(name_sections(&meta, &elements, "T")[&0], "3 Model");
    }

    #[test]
    fn names_change_only_at_headings() {
        let (meta, elements) = fixture(vec![
            vec![heading(0, 0, "A")],
            vec![text(1, 1)],
            vec![heading(2, 2, "B")],
            vec![text(3, 3)],
            vec![heading(4, 4, "  ")],
        ]);
        let names = name_sections(&meta, &elements, "T");
        for page in 1..names.len() {
            let headings: Vec<_> = elements[&page]
                .iter()
                .filter_map(|e| match &e.kind {
                    ElementKind::Heading { text } if !text.trim().is_empty() => Some(text.trim()),
                    _ => None,
                })
                .collect();
            assert!(names[&page] == names[&(page - 1)] || headings.contains(&names[&page].as_str()));
        }
    }

    #[test]
    fn excluded_sections() {
        assert!(is_excluded("References"));
        assert!(is_excluded("  REFERENCES "));
        assert!(is_excluded("7 References"));
        assert!(is_excluded("8. Bibliography"));
        assert!(!is_excluded("Introduction"));
        assert!(!is_excluded("References and Notes on Method"));
    }

    #[test]
    fn reference_only_pages() {
        let refs = vec![
            element(0, 0, ElementKind::Reference { text: "[1] Vaswani".into() }),
            element(1, 0, ElementKind::Footer { text: "12".into() }),
        ];
        assert!(is_reference_only(&refs));
        assert!(!is_reference_only(&[text(0, 0)]));
        assert!(!is_reference_only(&[]));
        assert!(is_page_excluded(Some("Appendix"), &refs));
        assert!(is_page_excluded(Some("References"), &[text(0, 0)]));
        assert!(!is_page_excluded(None, &[text(0, 0)]));
    }
}
