//! Translation of summaries and of the full original-content document.

use crate::error::PaperError;
use crate::pipeline::llm::{TextTransform, TransformRequest};
use crate::pipeline::summary::pack_groups;
use crate::state::{Stage, TranslatedDocument};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Translate every page summary. Any failed page aborts the stage.
pub async fn translate_summaries(
    transform: Arc<dyn TextTransform>,
    summaries: &BTreeMap<usize, String>,
    instruction: &str,
    concurrency: usize,
) -> Result<BTreeMap<usize, String>, PaperError> {
    let translated: Vec<(usize, String)> =
        stream::iter(summaries.clone().into_iter().map(|(page, summary)| {
            let transform = Arc::clone(&transform);
            let request = TransformRequest::text(instruction, summary.as_str());
            async move {
                let text = transform.transform(request).await.map_err(|source| {
                    PaperError::Transform {
                        stage: Stage::SummaryTranslation,
                        unit: format!("page {}", page),
                        source,
                    }
                })?;
                Ok::<_, PaperError>((page, text))
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    info!("Translated {} page summaries", translated.len());
    Ok(translated.into_iter().collect())
}

/// Translate a single text (the paper summary).
pub async fn translate_one(
    transform: &Arc<dyn TextTransform>,
    text: &str,
    instruction: &str,
    stage: Stage,
    unit: &str,
) -> Result<String, PaperError> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }
    transform
        .transform(TransformRequest::text(instruction, text))
        .await
        .map_err(|source| PaperError::Transform {
            stage,
            unit: unit.to_string(),
            source,
        })
}

/// Split markdown at top-level (`# `) headings.
///
/// Returns the document's opening heading line, kept verbatim, and the
/// translatable blocks. Every block after the first starts with its heading;
/// the body under the opening heading is a block of its own. A document that
/// does not open with a heading has no head.
pub fn split_blocks(markdown: &str) -> (String, Vec<String>) {
    let mut segments: Vec<Vec<&str>> = vec![Vec::new()];
    for line in markdown.lines() {
        let starts_block = line.starts_with("# ");
        let current_empty = segments.last().is_some_and(|s| s.iter().all(|l| l.trim().is_empty()));
        if starts_block && !current_empty {
            segments.push(Vec::new());
        }
        if let Some(current) = segments.last_mut() {
            current.push(line);
        }
    }

    let mut blocks: Vec<String> = segments
        .into_iter()
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|b| !b.is_empty())
        .collect();

    match blocks.first() {
        Some(first) if first.starts_with("# ") => {}
        _ => return (String::new(), blocks),
    }
    let first = blocks.remove(0);
    let (heading, body) = first.split_once('\n').unwrap_or((first.as_str(), ""));
    let body = body.trim();
    if !body.is_empty() {
        blocks.insert(0, body.to_string());
    }
    (heading.trim_end().to_string(), blocks)
}

/// Translate the original-content markdown block by block.
///
/// The opening heading is kept verbatim. Blocks longer than `chunk_chars` are
/// translated paragraph group by paragraph group and re-joined, so the
/// output keeps the block structure of the input.
pub async fn translate_document(
    transform: Arc<dyn TextTransform>,
    markdown: &str,
    instruction: &str,
    chunk_chars: usize,
    concurrency: usize,
) -> Result<TranslatedDocument, PaperError> {
    let (head, blocks) = split_blocks(markdown);

    let chunks: Vec<(usize, String)> = blocks
        .iter()
        .enumerate()
        .flat_map(|(i, block)| {
            let paragraphs: Vec<String> = block.split("\n\n").map(str::to_string).collect();
            pack_groups(&paragraphs, chunk_chars)
                .into_iter()
                .map(move |chunk| (i, chunk))
        })
        .collect();
    debug!("Translating {} blocks in {} chunks", blocks.len(), chunks.len());

    let translated: Vec<(usize, String)> =
        stream::iter(chunks.into_iter().enumerate().map(|(n, (block, chunk))| {
            let transform = Arc::clone(&transform);
            let request = TransformRequest::text(instruction, chunk);
            async move {
                let text = transform.transform(request).await.map_err(|source| {
                    PaperError::Transform {
                        stage: Stage::FullTranslation,
                        unit: format!("block {} chunk {}", block, n),
                        source,
                    }
                })?;
                Ok::<_, PaperError>((block, text))
            }
        }))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let mut out = vec![String::new(); blocks.len()];
    for (block, text) in translated {
        if !out[block].is_empty() {
            out[block].push_str("\n\n");
        }
        out[block].push_str(&text);
    }

    info!("Translated {} document blocks", out.len());
    Ok(TranslatedDocument { head, blocks: out })
}
