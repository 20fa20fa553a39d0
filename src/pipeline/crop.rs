//! Media cropping: cut image, table and equation regions out of page
//! renderings and write them as PNG assets.
//!
//! Each page with media is rendered once. Bounding boxes are in page units,
//! so they are scaled by the rendering's pixel size, clamped to the image,
//! and rounded outwards (floor for the near edge, ceil for the far edge) so
//! a region never loses its last row or column of ink.
//!
//! A region that cannot be cut (degenerate box, render failure, write
//! failure) is reported as a [`UnitError`] and left out; the run continues.

use crate::element::{asset_file_name, BoundingBox, Element, MediaAsset, PageMetadata};
use crate::error::{PaperError, UnitError};
use crate::pipeline::render::{self, PdfBackend};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Directory, relative to the paper directory, holding the assets.
pub const ASSET_DIR: &str = "assets";

/// Pixel rectangle `(x, y, width, height)` for `bbox` on a rendering of
/// `image_size` pixels of a page of `page_size` units. `None` when the
/// clamped region is empty.
pub fn pixel_region(
    bbox: &BoundingBox,
    page_size: (f32, f32),
    image_size: (u32, u32),
) -> Option<(u32, u32, u32, u32)> {
    let (page_w, page_h) = page_size;
    let (img_w, img_h) = (image_size.0 as f32, image_size.1 as f32);
    if page_w <= 0.0 || page_h <= 0.0 || img_w <= 0.0 || img_h <= 0.0 {
        return None;
    }
    let sx = img_w / page_w;
    let sy = img_h / page_h;

    let left = (bbox.x0 * sx).floor().clamp(0.0, img_w) as u32;
    let top = (bbox.y0 * sy).floor().clamp(0.0, img_h) as u32;
    let right = (bbox.x1 * sx).ceil().clamp(0.0, img_w) as u32;
    let bottom = (bbox.y1 * sy).ceil().clamp(0.0, img_h) as u32;

    if right <= left || bottom <= top {
        return None;
    }
    Some((left, top, right - left, bottom - top))
}

/// Crop every media element of one page out of its rendering.
///
/// Blocking: call from `spawn_blocking`.
pub fn crop_page(
    image: &DynamicImage,
    page: &PageMetadata,
    elements: &[Element],
    asset_dir: &Path,
) -> (Vec<MediaAsset>, Vec<UnitError>) {
    let mut assets = Vec::new();
    let mut errors = Vec::new();

    for element in elements {
        let Some(kind) = element.kind.media_kind() else {
            continue;
        };
        let fail = |detail: String| UnitError::CropFailed {
            page: element.page,
            element: element.id,
            detail,
        };

        let Some((x, y, w, h)) = pixel_region(
            &element.bbox,
            (page.width, page.height),
            (image.width(), image.height()),
        ) else {
            errors.push(fail(format!("empty region {:?}", element.bbox)));
            continue;
        };

        let file_name = asset_file_name(kind, element.page, element.id);
        let path = asset_dir.join(&file_name);
        if let Err(e) = image.crop_imm(x, y, w, h).save(&path) {
            errors.push(fail(e.to_string()));
            continue;
        }

        debug!("Cropped {} → {} ({}x{})", element.id, file_name, w, h);
        assets.push(MediaAsset {
            element_id: element.id,
            page: element.page,
            kind,
            path,
            relative_path: format!("{}/{}", ASSET_DIR, file_name),
            context: element.kind.text().map(str::to_string).filter(|t| !t.is_empty()),
        });
    }

    (assets, errors)
}

/// Render each page that has media and crop its elements into `asset_dir`.
///
/// Assets come back in document order.
pub async fn crop_media(
    backend: Arc<dyn PdfBackend>,
    pdf: &Path,
    pages: &BTreeMap<usize, PageMetadata>,
    elements: &BTreeMap<usize, Vec<Element>>,
    asset_dir: &Path,
    max_pixels: u32,
) -> Result<(Vec<MediaAsset>, Vec<UnitError>), PaperError> {
    tokio::fs::create_dir_all(asset_dir)
        .await
        .map_err(|e| PaperError::io(asset_dir, e))?;

    let mut assets = Vec::new();
    let mut errors = Vec::new();

    for (&index, page) in pages {
        let page_elements: Vec<Element> = elements
            .get(&index)
            .into_iter()
            .flatten()
            .filter(|e| e.kind.media_kind().is_some())
            .cloned()
            .collect();
        if page_elements.is_empty() {
            continue;
        }

        let image = match render::render_page(Arc::clone(&backend), pdf, index, max_pixels).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Page {} could not be rendered for cropping: {}", index, e);
                errors.extend(page_elements.iter().map(|el| UnitError::CropFailed {
                    page: index,
                    element: el.id,
                    detail: e.to_string(),
                }));
                continue;
            }
        };

        let page = page.clone();
        let dir = asset_dir.to_path_buf();
        let (page_assets, page_errors) =
            tokio::task::spawn_blocking(move || crop_page(&image, &page, &page_elements, &dir))
                .await
                .map_err(|e| PaperError::Internal(format!("Crop task panicked: {}", e)))?;

        for err in &page_errors {
            warn!("{}", err);
        }
        assets.extend(page_assets);
        errors.extend(page_errors);
    }

    info!("Cropped {} media assets ({} failed)", assets.len(), errors.len());
    Ok((assets, errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementKind, MediaKind};
    use image::{Rgba, RgbaImage};

    fn media(id: usize, kind: ElementKind, bbox: BoundingBox) -> Element {
        Element {
            id,
            page: 0,
            bbox,
            html: String::new(),
            kind,
        }
    }

    #[test]
    fn region_scales_and_rounds_outwards() {
        let bbox = BoundingBox::new(10.2, 20.7, 50.5, 60.1);
        // Rendering at 2x the page size.
        let region = pixel_region(&bbox, (100.0, 200.0), (200, 400)).unwrap();
        assert_eq!(region, (20, 41, 81, 80));
    }

    #[test]
    fn region_is_clamped_to_image() {
        let bbox = BoundingBox::new(-5.0, -5.0, 500.0, 500.0);
        assert_eq!(pixel_region(&bbox, (100.0, 100.0), (100, 100)), Some((0, 0, 100, 100)));
    }

    #[test]
    fn degenerate_regions_are_rejected() {
        let flat = BoundingBox::new(10.0, 10.0, 10.0, 50.0);
        assert_eq!(pixel_region(&flat, (100.0, 100.0), (100, 100)), None);
        let outside = BoundingBox::new(150.0, 150.0, 160.0, 160.0);
        assert_eq!(pixel_region(&outside, (100.0, 100.0), (100, 100)), None);
        let ok = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(pixel_region(&ok, (0.0, 100.0), (100, 100)), None);
    }

    #[test]
    fn crop_page_writes_assets_and_reports_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 200, Rgba([0, 0, 0, 255])));
        let page = PageMetadata {
            page: 0,
            width: 100.0,
            height: 100.0,
            element_ids: vec![0, 1, 2, 3],
        };
        let elements = vec![
            media(0, ElementKind::Image, BoundingBox::new(0.0, 0.0, 50.0, 50.0)),
            media(1, ElementKind::Text { text: "x".into() }, BoundingBox::new(0.0, 0.0, 50.0, 50.0)),
            media(2, ElementKind::Equation { text: "E=mc^2".into() }, BoundingBox::new(0.0, 60.0, 100.0, 70.0)),
            media(3, ElementKind::Table { text: String::new() }, BoundingBox::new(30.0, 30.0, 30.0, 30.0)),
        ];

        let (assets, errors) = crop_page(&image, &page, &elements, tmp.path());

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].kind, MediaKind::Image);
        assert_eq!(assets[0].relative_path, "assets/image_p0000_e0000.png");
        assert_eq!(assets[1].context.as_deref(), Some("E=mc^2"));
        assert!(assets[0].context.is_none());

        let cropped = image::open(&assets[1].path).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (200, 20));

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], UnitError::CropFailed { element: 3, .. }));
    }
}
