//! Split the source PDF into page batches for layout analysis.

use crate::error::PaperError;
use crate::pipeline::render::{self, PdfBackend};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Contiguous 0-based page ranges of at most `batch_size` pages covering
/// `0..total_pages`. Every range but the last has exactly `batch_size` pages.
pub fn batch_ranges(total_pages: usize, batch_size: usize) -> Vec<RangeInclusive<usize>> {
    let batch_size = batch_size.max(1);
    (0..total_pages)
        .step_by(batch_size)
        .map(|start| start..=(start + batch_size).min(total_pages) - 1)
        .collect()
}

/// Scratch file name for one batch.
pub fn batch_file_name(stem: &str, range: &RangeInclusive<usize>) -> String {
    format!("{}_{:04}_{:04}.pdf", stem, range.start(), range.end())
}

/// Write one PDF per batch into `scratch` and return their paths in page order.
pub async fn split_pdf(
    backend: Arc<dyn PdfBackend>,
    pdf: &Path,
    total_pages: usize,
    batch_size: usize,
    scratch: &Path,
) -> Result<Vec<PathBuf>, PaperError> {
    if batch_size == 0 {
        return Err(PaperError::InvalidConfig("Batch size must be ≥ 1".into()));
    }
    if total_pages == 0 {
        return Err(PaperError::NoPages {
            path: pdf.to_path_buf(),
        });
    }

    let stem = file_stem(pdf);
    let ranges = batch_ranges(total_pages, batch_size);
    let mut paths = Vec::with_capacity(ranges.len());

    for range in ranges {
        let dest = scratch.join(batch_file_name(&stem, &range));
        render::write_page_range(Arc::clone(&backend), pdf, range, dest.clone()).await?;
        paths.push(dest);
    }

    info!("Split {} pages into {} batches", total_pages, paths.len());
    Ok(paths)
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "paper".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_cover_every_page_once() {
        assert_eq!(batch_ranges(25, 10), vec![0..=9, 10..=19, 20..=24]);
        assert_eq!(batch_ranges(10, 10), vec![0..=9]);
        assert_eq!(batch_ranges(3, 10), vec![0..=2]);
        assert_eq!(batch_ranges(1, 1), vec![0..=0]);
        assert!(batch_ranges(0, 10).is_empty());
    }

    #[test]
    fn batch_count_is_ceiling() {
        for (pages, size) in [(1, 1), (7, 3), (30, 10), (31, 10), (100, 7)] {
            let ranges = batch_ranges(pages, size);
            assert_eq!(ranges.len(), pages.div_ceil(size));
            let covered: usize = ranges.iter().map(|r| r.end() - r.start() + 1).sum();
            assert_eq!(covered, pages);
        }
    }

    #[test]
    fn batch_names_are_zero_padded() {
        assert_eq!(batch_file_name("attention", &(10..=19)), "attention_0010_0019.pdf");
    }
}
