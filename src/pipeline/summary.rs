//! Map-reduce summarization.
//!
//! Map: one summary per page, computed concurrently. Reduce: the page
//! summaries, joined in page order, merged into one paper summary. When the
//! joined text is longer than the reduce budget the summaries are packed into
//! groups that fit, each group is reduced, and the group results are reduced
//! again until a single call suffices.

use crate::error::PaperError;
use crate::pipeline::llm::{TextTransform, TransformRequest};
use crate::state::Stage;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const SUMMARY_SEPARATOR: &str = "\n\n";

/// Summarize each `(page, text)` pair. Any failed page aborts the stage.
pub async fn summarize_pages(
    transform: Arc<dyn TextTransform>,
    pages: Vec<(usize, String)>,
    instruction: &str,
    concurrency: usize,
) -> Result<BTreeMap<usize, String>, PaperError> {
    let start = Instant::now();
    let total = pages.len();

    let summaries: Vec<(usize, String)> = stream::iter(pages.into_iter().map(|(page, text)| {
        let transform = Arc::clone(&transform);
        let request = TransformRequest::text(instruction, text);
        async move {
            let summary = transform
                .transform(request)
                .await
                .map_err(|source| PaperError::Transform {
                    stage: Stage::PageSummaries,
                    unit: format!("page {}", page),
                    source,
                })?;
            debug!("Page {} summarized ({} chars)", page, summary.len());
            Ok::<_, PaperError>((page, summary))
        }
    }))
    .buffer_unordered(concurrency.max(1))
    .try_collect()
    .await?;

    info!(
        "Summarized {} pages in {}ms",
        total,
        start.elapsed().as_millis()
    );
    Ok(summaries.into_iter().collect())
}

/// Merge page summaries (in page order) into one paper summary.
///
/// Returns an empty string when there is nothing to merge.
pub async fn reduce_summaries(
    transform: Arc<dyn TextTransform>,
    summaries: &BTreeMap<usize, String>,
    instruction: &str,
    input_limit: usize,
    concurrency: usize,
) -> Result<String, PaperError> {
    let mut items: Vec<String> = summaries
        .values()
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .collect();
    if items.is_empty() {
        return Ok(String::new());
    }

    let mut level = 0;
    loop {
        let joined = items.join(SUMMARY_SEPARATOR);
        if items.len() == 1 || joined.chars().count() <= input_limit {
            return reduce_call(&transform, instruction, joined, format!("reduce level {}", level))
                .await;
        }

        let groups = pack_groups(&items, input_limit);
        if groups.len() >= items.len() {
            debug!("Reduce input cannot be packed below {} chars; using one call", input_limit);
            return reduce_call(&transform, instruction, joined, format!("reduce level {}", level))
                .await;
        }

        debug!(
            "Reduce level {}: {} summaries packed into {} groups",
            level,
            items.len(),
            groups.len()
        );
        items = stream::iter(groups.into_iter().enumerate().map(|(i, group)| {
            let transform = Arc::clone(&transform);
            let unit = format!("reduce level {} group {}", level, i);
            async move { reduce_call(&transform, instruction, group, unit).await }
        }))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;
        level += 1;
    }
}

async fn reduce_call(
    transform: &Arc<dyn TextTransform>,
    instruction: &str,
    input: String,
    unit: String,
) -> Result<String, PaperError> {
    transform
        .transform(TransformRequest::text(instruction, input))
        .await
        .map_err(|source| PaperError::Transform {
            stage: Stage::PaperSummary,
            unit,
            source,
        })
}

/// Greedily pack consecutive items into joined groups of at most `limit`
/// characters. An item longer than `limit` forms a group of its own.
pub fn pack_groups(items: &[String], limit: usize) -> Vec<String> {
    let sep = SUMMARY_SEPARATOR.chars().count();
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for item in items {
        let len = item.chars().count();
        if !current.is_empty() && current_len + sep + len > limit {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str(SUMMARY_SEPARATOR);
            current_len += sep;
        }
        current.push_str(item);
        current_len += len;
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
