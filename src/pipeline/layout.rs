//! Layout analysis: send each PDF batch to the layout service and keep the
//! raw response bodies as scratch files.
//!
//! The service is reached through [`LayoutAnalyzer`]. Responses are parsed
//! later by [`crate::pipeline::extract`]; this stage only moves bytes, so a
//! failed parse never costs a second paid call.

use crate::error::PaperError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A layout-analysis service. Returns the raw JSON response body for one batch.
#[async_trait]
pub trait LayoutAnalyzer: Send + Sync {
    async fn analyze(&self, batch_pdf: &Path, batch: usize) -> Result<String, PaperError>;
}

/// [`LayoutAnalyzer`] for the Upstage document-AI layout endpoint.
pub struct UpstageLayoutAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
}

impl fmt::Debug for UpstageLayoutAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstageLayoutAnalyzer")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl UpstageLayoutAnalyzer {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, PaperError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PaperError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl LayoutAnalyzer for UpstageLayoutAnalyzer {
    async fn analyze(&self, batch_pdf: &Path, batch: usize) -> Result<String, PaperError> {
        let bytes = tokio::fs::read(batch_pdf)
            .await
            .map_err(|e| PaperError::io(batch_pdf, e))?;
        let file_name = batch_pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("batch_{batch}.pdf"));

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")
            .map_err(|e| PaperError::Internal(e.to_string()))?;
        let form = Form::new().part("document", part).text("ocr", "false");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_error(batch, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PaperError::LayoutRateLimited { batch });
        }
        let body = response
            .text()
            .await
            .map_err(|e| self.request_error(batch, e))?;
        if !status.is_success() {
            return Err(PaperError::LayoutFailed {
                batch,
                detail: format!("HTTP {}: {}", status, truncate(&body, 300)),
            });
        }
        Ok(body)
    }
}

impl UpstageLayoutAnalyzer {
    fn request_error(&self, batch: usize, e: reqwest::Error) -> PaperError {
        if e.is_timeout() {
            PaperError::LayoutTimeout {
                batch,
                secs: self.timeout_secs,
            }
        } else {
            PaperError::LayoutFailed {
                batch,
                detail: e.to_string(),
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Scratch file name for one batch's response.
pub fn response_file_name(stem: &str, batch: usize) -> String {
    format!("{}_{:04}.json", stem, batch)
}

/// Analyze every batch and write each response next to the batches.
///
/// Batches are analyzed with bounded concurrency; the returned paths are in
/// batch order. The first failing batch aborts the stage.
pub async fn analyze_batches(
    analyzer: Arc<dyn LayoutAnalyzer>,
    batches: &[PathBuf],
    stem: &str,
    scratch: &Path,
    concurrency: usize,
) -> Result<Vec<PathBuf>, PaperError> {
    let start = Instant::now();
    let paths: Vec<PathBuf> = stream::iter(batches.iter().cloned().enumerate().map(|(batch, pdf)| {
        let analyzer = Arc::clone(&analyzer);
        let dest = scratch.join(response_file_name(stem, batch));
        async move {
            let body = analyzer.analyze(&pdf, batch).await?;
            tokio::fs::write(&dest, body.as_bytes())
                .await
                .map_err(|e| PaperError::io(&dest, e))?;
            debug!("Batch {} analyzed → {}", batch, dest.display());
            Ok::<_, PaperError>(dest)
        }
    }))
    .buffered(concurrency.max(1))
    .try_collect()
    .await?;

    info!(
        "Layout analysis: {} batches in {}ms",
        paths.len(),
        start.elapsed().as_millis()
    );
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoAnalyzer {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl LayoutAnalyzer for EchoAnalyzer {
        async fn analyze(&self, _batch_pdf: &Path, batch: usize) -> Result<String, PaperError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(batch) {
                return Err(PaperError::LayoutRateLimited { batch });
            }
            Ok(format!("{{\"batch\":{batch}}}"))
        }
    }

    #[tokio::test]
    async fn responses_are_written_in_batch_order() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Arc::new(EchoAnalyzer {
            calls: AtomicUsize::new(0),
            fail_on: None,
        });
        let batches = vec![tmp.path().join("a.pdf"), tmp.path().join("b.pdf")];
        let paths = analyze_batches(analyzer.clone(), &batches, "paper", tmp.path(), 4)
            .await
            .unwrap();

        assert_eq!(paths[0].file_name().unwrap(), "paper_0000.json");
        assert_eq!(paths[1].file_name().unwrap(), "paper_0001.json");
        assert_eq!(std::fs::read_to_string(&paths[1]).unwrap(), "{\"batch\":1}");
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_batch_aborts_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let analyzer = Arc::new(EchoAnalyzer {
            calls: AtomicUsize::new(0),
            fail_on: Some(1),
        });
        let batches = vec![tmp.path().join("a.pdf"), tmp.path().join("b.pdf")];
        let err = analyze_batches(analyzer, &batches, "paper", tmp.path(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, PaperError::LayoutRateLimited { batch: 1 }));
    }

    #[test]
    fn debug_redacts_api_key() {
        let analyzer = UpstageLayoutAnalyzer::new("up_secret", "https://example.test", 5).unwrap();
        let dbg = format!("{analyzer:?}");
        assert!(!dbg.contains("up_secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("한국어 텍스트", 3), "한국어");
        assert_eq!(truncate("short", 300), "short");
    }
}
