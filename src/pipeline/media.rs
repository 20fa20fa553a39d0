//! Media captions: describe every cropped image, table and equation, and
//! weave equation captions back into the ordered HTML sequence.

use crate::element::{ElementId, MediaAsset, MediaCaption, MediaKind};
use crate::error::{TransformError, UnitError};
use crate::pipeline::encode;
use crate::pipeline::llm::{TextTransform, TransformRequest};
use crate::pipeline::markdown::escape_html;
use crate::prompts::Prompts;
use crate::state::HtmlFragment;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Captions produced by one run of the media stage.
#[derive(Debug, Default)]
pub struct MediaCaptions {
    pub images: Vec<MediaCaption>,
    pub tables: Vec<MediaCaption>,
    pub equations: BTreeMap<ElementId, String>,
    /// Assets whose caption could not be produced; they are left out.
    pub errors: Vec<UnitError>,
}

/// Caption all assets, kind by kind, `batch_size` assets at a time.
///
/// Calls within a batch run concurrently; batches run one after another.
pub async fn caption_media(
    transform: Arc<dyn TextTransform>,
    assets: &[MediaAsset],
    prompts: &Prompts,
    batch_size: usize,
) -> MediaCaptions {
    let mut out = MediaCaptions::default();

    for kind in MediaKind::ALL {
        let of_kind: Vec<&MediaAsset> = assets.iter().filter(|a| a.kind == kind).collect();
        if of_kind.is_empty() {
            continue;
        }
        let instruction = prompts.caption_for(kind);

        for (n, batch) in of_kind.chunks(batch_size.max(1)).enumerate() {
            debug!("Captioning {} batch {} ({} assets)", kind, n, batch.len());
            let results = join_all(
                batch
                    .iter()
                    .map(|asset| caption_one(Arc::clone(&transform), asset, instruction)),
            )
            .await;

            for (asset, result) in batch.iter().zip(results) {
                match result {
                    Ok(caption) => match kind {
                        MediaKind::Image => out.images.push(to_caption(asset, caption)),
                        MediaKind::Table => out.tables.push(to_caption(asset, caption)),
                        MediaKind::Equation => {
                            out.equations.insert(asset.element_id, caption);
                        }
                    },
                    Err(source) => {
                        let err = UnitError::CaptionFailed {
                            page: asset.page,
                            element: asset.element_id,
                            source,
                        };
                        warn!("{}", err);
                        out.errors.push(err);
                    }
                }
            }
        }
    }

    info!(
        "Captioned {} images, {} tables, {} equations ({} failed)",
        out.images.len(),
        out.tables.len(),
        out.equations.len(),
        out.errors.len()
    );
    out
}

async fn caption_one(
    transform: Arc<dyn TextTransform>,
    asset: &MediaAsset,
    instruction: &str,
) -> Result<String, TransformError> {
    let image = encode::encode_asset(&asset.path)
        .await
        .map_err(|detail| TransformError::Malformed { detail })?;
    let input = match &asset.context {
        Some(context) => format!("Context:\n{}", context),
        None => String::new(),
    };
    transform
        .transform(TransformRequest::text(instruction, input).with_image(image))
        .await
}

fn to_caption(asset: &MediaAsset, caption: String) -> MediaCaption {
    MediaCaption {
        element_id: asset.element_id,
        page: asset.page,
        kind: asset.kind,
        relative_path: asset.relative_path.clone(),
        caption,
    }
}

/// HTML for a generated equation caption.
pub fn equation_caption_html(element_id: ElementId, caption: &str) -> String {
    format!(
        "<p id='{}_1' data-category='equation' style='font-size:14px'>{}</p>",
        element_id,
        escape_html(caption.trim())
    )
}

/// Insert each equation caption immediately after its equation's fragment.
///
/// Insertion points are resolved against the input sequence, sorted once,
/// and applied in a single pass, so the relative order of every existing
/// fragment is unchanged. Captions whose equation has no fragment, or that
/// were already inserted, are skipped.
pub fn merge_equation_captions(
    html: &[HtmlFragment],
    captions: &BTreeMap<ElementId, String>,
) -> Vec<HtmlFragment> {
    let mut insertions: Vec<(usize, HtmlFragment)> = captions
        .iter()
        .filter(|(id, _)| !html.iter().any(|f| f.generated && f.element_id == **id))
        .filter_map(|(&id, caption)| {
            let position = html
                .iter()
                .position(|f| !f.generated && f.element_id == id)?;
            Some((
                position + 1,
                HtmlFragment {
                    element_id: id,
                    generated: true,
                    html: equation_caption_html(id, caption),
                },
            ))
        })
        .collect();
    insertions.sort_by_key(|(position, _)| *position);

    let mut merged = Vec::with_capacity(html.len() + insertions.len());
    let mut pending = insertions.into_iter().peekable();
    for (index, fragment) in html.iter().enumerate() {
        while let Some((_, generated)) = pending.next_if(|(position, _)| *position == index) {
            merged.push(generated);
        }
        merged.push(fragment.clone());
    }
    merged.extend(pending.map(|(_, generated)| generated));
    merged
}
