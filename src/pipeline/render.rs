//! PDF access: page count, page-range extraction and page rendering.
//!
//! [`PdfBackend`] is synchronous because pdfium is; the async helpers at the
//! bottom of this module move each call onto `spawn_blocking` so the Tokio
//! workers never stall on CPU-heavy rendering.

use crate::error::PaperError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// What the pipeline needs to know about a PDF before splitting it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PdfInfo {
    pub page_count: usize,
    /// Metadata title, if the document declares a non-empty one.
    pub title: Option<String>,
}

/// Low-level PDF operations.
pub trait PdfBackend: Send + Sync {
    fn info(&self, pdf: &Path) -> Result<PdfInfo, PaperError>;

    /// Copy the 0-based, inclusive page range into a new PDF at `dest`.
    fn write_page_range(
        &self,
        pdf: &Path,
        pages: RangeInclusive<usize>,
        dest: &Path,
    ) -> Result<(), PaperError>;

    /// Render one 0-based page with its longest edge capped at `max_pixels`.
    fn render_page(&self, pdf: &Path, page: usize, max_pixels: u32)
        -> Result<DynamicImage, PaperError>;
}

/// [`PdfBackend`] over the pdfium library.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumBackend;

impl PdfiumBackend {
    fn open<'a>(pdfium: &'a Pdfium, pdf: &Path) -> Result<PdfDocument<'a>, PaperError> {
        pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| PaperError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail: format!("{:?}", e),
            })
    }
}

impl PdfBackend for PdfiumBackend {
    fn info(&self, pdf: &Path) -> Result<PdfInfo, PaperError> {
        let pdfium = Pdfium::default();
        let document = Self::open(&pdfium, pdf)?;

        let title = document
            .metadata()
            .get(PdfDocumentMetadataTagType::Title)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(PdfInfo {
            page_count: document.pages().len() as usize,
            title,
        })
    }

    fn write_page_range(
        &self,
        pdf: &Path,
        pages: RangeInclusive<usize>,
        dest: &Path,
    ) -> Result<(), PaperError> {
        let (start, end) = (*pages.start(), *pages.end());
        let split_err = |detail: String| PaperError::SplitFailed {
            path: pdf.to_path_buf(),
            start,
            end,
            detail,
        };

        let pdfium = Pdfium::default();
        let source = Self::open(&pdfium, pdf)?;
        let mut batch = pdfium
            .create_new_pdf()
            .map_err(|e| split_err(format!("{:?}", e)))?;
        batch
            .pages_mut()
            .copy_page_range_from_document(
                &source,
                start as PdfPageIndex..=end as PdfPageIndex,
                0,
            )
            .map_err(|e| split_err(format!("{:?}", e)))?;
        batch
            .save_to_file(dest)
            .map_err(|e| split_err(format!("{:?}", e)))?;

        debug!("Wrote pages {}-{} → {}", start, end, dest.display());
        Ok(())
    }

    fn render_page(
        &self,
        pdf: &Path,
        page: usize,
        max_pixels: u32,
    ) -> Result<DynamicImage, PaperError> {
        let pdfium = Pdfium::default();
        let document = Self::open(&pdfium, pdf)?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let pdf_page = document
            .pages()
            .get(page as PdfPageIndex)
            .map_err(|e| PaperError::RenderFailed {
                page,
                detail: format!("{:?}", e),
            })?;
        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| PaperError::RenderFailed {
                page,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", page, image.width(), image.height());
        Ok(image)
    }
}

// ── Async wrappers ───────────────────────────────────────────────────────────

pub async fn pdf_info(backend: Arc<dyn PdfBackend>, pdf: &Path) -> Result<PdfInfo, PaperError> {
    let path = pdf.to_path_buf();
    tokio::task::spawn_blocking(move || backend.info(&path))
        .await
        .map_err(|e| PaperError::Internal(format!("Metadata task panicked: {}", e)))?
}

pub async fn write_page_range(
    backend: Arc<dyn PdfBackend>,
    pdf: &Path,
    pages: RangeInclusive<usize>,
    dest: PathBuf,
) -> Result<(), PaperError> {
    let path = pdf.to_path_buf();
    tokio::task::spawn_blocking(move || backend.write_page_range(&path, pages, &dest))
        .await
        .map_err(|e| PaperError::Internal(format!("Split task panicked: {}", e)))?
}

pub async fn render_page(
    backend: Arc<dyn PdfBackend>,
    pdf: &Path,
    page: usize,
    max_pixels: u32,
) -> Result<DynamicImage, PaperError> {
    let path = pdf.to_path_buf();
    tokio::task::spawn_blocking(move || backend.render_page(&path, page, max_pixels))
        .await
        .map_err(|e| PaperError::Internal(format!("Render task panicked: {}", e)))?
}
