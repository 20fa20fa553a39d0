//! Configuration for a pipeline run.
//!
//! Every knob lives in [`PipelineConfig`], built through
//! [`PipelineConfigBuilder`]. Credentials are deliberately not part of it:
//! they travel with each invocation (see [`crate::run::Credentials`]) so that
//! concurrent runs for different users never share keys.

use crate::error::PaperError;
use crate::progress::ProgressCallback;
use crate::prompts::Prompts;
use std::fmt;
use std::path::PathBuf;

/// Default Upstage layout-analysis endpoint.
pub const DEFAULT_LAYOUT_ENDPOINT: &str = "https://api.upstage.ai/v1/document-ai/layout-analysis";

/// Configuration shared by every stage of a run.
///
/// # Example
/// ```rust
/// use paper_digest::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(4)
///     .target_language("Korean")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum concurrent transform calls in a map phase. Default: 5.
    ///
    /// Provider rate limits bite before network bandwidth does; lower this
    /// when runs fail with rate-limit errors.
    pub concurrency: usize,

    /// Media assets captioned per batch. Default: 8.
    pub media_batch_size: usize,

    /// Longest edge, in pixels, of the page rendering used for cropping. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Sampling temperature for every transform. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens per transform response. Default: 2048.
    pub max_tokens: usize,

    /// Per-call timeout for generative transforms, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Per-batch timeout for layout analysis, in seconds. Default: 300.
    pub layout_timeout_secs: u64,

    /// Character budget for one reduce call. Default: 24 000.
    ///
    /// Concatenated page summaries longer than this are reduced in groups,
    /// and the group results reduced again.
    pub reduce_input_limit: usize,

    /// Character budget for one translation call. Default: 4 000.
    ///
    /// Document blocks longer than this are translated paragraph group by
    /// paragraph group.
    pub translation_chunk_chars: usize,

    /// Language of the translated documents. Default: "Korean".
    pub target_language: String,

    /// Instructions for every transform.
    pub prompts: Prompts,

    /// Layout analysis endpoint.
    pub layout_endpoint: String,

    /// Parent directory for each run's private scratch directory.
    /// Default: the OS temp directory.
    pub scratch_dir: Option<PathBuf>,

    /// Root for per-paper output (`{output_dir}/{paper_id}/assets/…`). Default: `papers`.
    pub output_dir: PathBuf,

    /// Write the final state as `analysis.json` next to the assets. Default: true.
    pub write_analysis: bool,

    /// Delete the source PDF once the documents are persisted. Default: false.
    pub remove_source_on_success: bool,

    /// Optional stage-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            media_batch_size: 8,
            max_rendered_pixels: 2000,
            temperature: 0.0,
            max_tokens: 2048,
            api_timeout_secs: 120,
            layout_timeout_secs: 300,
            reduce_input_limit: 24_000,
            translation_chunk_chars: 4_000,
            target_language: "Korean".to_string(),
            prompts: Prompts::default(),
            layout_endpoint: DEFAULT_LAYOUT_ENDPOINT.to_string(),
            scratch_dir: None,
            output_dir: PathBuf::from("papers"),
            write_analysis: true,
            remove_source_on_success: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("media_batch_size", &self.media_batch_size)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("layout_timeout_secs", &self.layout_timeout_secs)
            .field("reduce_input_limit", &self.reduce_input_limit)
            .field("translation_chunk_chars", &self.translation_chunk_chars)
            .field("target_language", &self.target_language)
            .field("layout_endpoint", &self.layout_endpoint)
            .field("scratch_dir", &self.scratch_dir)
            .field("output_dir", &self.output_dir)
            .field("write_analysis", &self.write_analysis)
            .field("remove_source_on_success", &self.remove_source_on_success)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory holding everything persisted for one paper.
    pub fn paper_dir(&self, paper_id: i64) -> PathBuf {
        self.output_dir.join(paper_id.to_string())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn media_batch_size(mut self, n: usize) -> Self {
        self.config.media_batch_size = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn layout_timeout_secs(mut self, secs: u64) -> Self {
        self.config.layout_timeout_secs = secs;
        self
    }

    pub fn reduce_input_limit(mut self, chars: usize) -> Self {
        self.config.reduce_input_limit = chars;
        self
    }

    pub fn translation_chunk_chars(mut self, chars: usize) -> Self {
        self.config.translation_chunk_chars = chars;
        self
    }

    pub fn target_language(mut self, language: impl Into<String>) -> Self {
        self.config.target_language = language.into();
        self
    }

    pub fn prompts(mut self, prompts: Prompts) -> Self {
        self.config.prompts = prompts;
        self
    }

    pub fn layout_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.layout_endpoint = url.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn write_analysis(mut self, v: bool) -> Self {
        self.config.write_analysis = v;
        self
    }

    pub fn remove_source_on_success(mut self, v: bool) -> Self {
        self.config.remove_source_on_success = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PaperError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PaperError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.media_batch_size == 0 {
            return Err(PaperError::InvalidConfig(
                "Media batch size must be ≥ 1".into(),
            ));
        }
        if c.reduce_input_limit < 256 {
            return Err(PaperError::InvalidConfig(format!(
                "Reduce input limit must be ≥ 256 characters, got {}",
                c.reduce_input_limit
            )));
        }
        if c.translation_chunk_chars < 256 {
            return Err(PaperError::InvalidConfig(format!(
                "Translation chunk size must be ≥ 256 characters, got {}",
                c.translation_chunk_chars
            )));
        }
        if c.target_language.trim().is_empty() {
            return Err(PaperError::InvalidConfig(
                "Target language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.target_language, "Korean");
        assert_eq!(config.layout_endpoint, DEFAULT_LAYOUT_ENDPOINT);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = PipelineConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, PaperError::InvalidConfig(_)));
    }

    #[test]
    fn tiny_reduce_limit_rejected() {
        assert!(PipelineConfig::builder().reduce_input_limit(10).build().is_err());
    }

    #[test]
    fn tiny_translation_chunk_rejected() {
        let err = PipelineConfig::builder()
            .translation_chunk_chars(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Translation chunk"));
    }

    #[test]
    fn temperature_is_clamped() {
        let config = PipelineConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(config.temperature, 2.0);
    }

    #[test]
    fn paper_dir_is_keyed_by_id() {
        let config = PipelineConfig::builder().output_dir("/tmp/out").build().unwrap();
        assert_eq!(config.paper_dir(42), PathBuf::from("/tmp/out/42"));
    }
}
