//! Generative text transform: instruction + input (+ images) → text.
//!
//! Every summary, translation and caption goes through [`TextTransform`].
//! The default implementation, [`LlmTransform`], drives an
//! `edgequake_llm` provider; tests substitute their own implementation.
//! Prompt wording lives in [`crate::prompts`], not here.

use crate::config::PipelineConfig;
use crate::error::TransformError;
use crate::pipeline::postprocess;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// One call to a generative transform.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// Sent as the system message.
    pub instruction: String,
    pub input: String,
    /// Base64 PNG attachments (media captions only).
    pub images: Vec<ImageData>,
}

impl TransformRequest {
    pub fn text(instruction: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            input: input.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: ImageData) -> Self {
        self.images.push(image);
        self
    }
}

/// A generative transform. Implementations must be safe to call concurrently.
#[async_trait]
pub trait TextTransform: Send + Sync {
    async fn transform(&self, request: TransformRequest) -> Result<String, TransformError>;
}

/// [`TextTransform`] backed by an `edgequake_llm` provider.
pub struct LlmTransform {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl LlmTransform {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout_secs: config.api_timeout_secs,
        }
    }
}

#[async_trait]
impl TextTransform for LlmTransform {
    async fn transform(&self, request: TransformRequest) -> Result<String, TransformError> {
        let start = Instant::now();
        let messages = build_messages(&request);

        let response = timeout(
            Duration::from_secs(self.timeout_secs),
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        .map_err(|_| TransformError::Timeout {
            secs: self.timeout_secs,
        })?
        .map_err(|e| TransformError::from_provider_message(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let text = postprocess::clean_model_output(&response.content);
        if text.is_empty() {
            return Err(TransformError::Malformed {
                detail: "empty response".into(),
            });
        }
        Ok(text)
    }
}

/// System message with the instruction, then one user message carrying the
/// input and any images.
fn build_messages(request: &TransformRequest) -> Vec<ChatMessage> {
    let user = if request.images.is_empty() {
        ChatMessage::user(request.input.as_str())
    } else {
        ChatMessage::user_with_images(request.input.as_str(), request.images.clone())
    };
    vec![ChatMessage::system(request.instruction.as_str()), user]
}

fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = PipelineConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn text_request_builds_system_and_user_messages() {
        let request = TransformRequest::text("Summarize.", "Some page text");
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn image_requests_attach_images() {
        let request = TransformRequest::text("Describe.", "")
            .with_image(ImageData::new("AAAA", "image/png"));
        assert_eq!(request.images.len(), 1);
        assert_eq!(request.images[0].mime_type, "image/png");
        assert_eq!(build_messages(&request).len(), 2);
    }
}
