//! Model interaction: send one page image with the byline prompt.
//!
//! [`VisionModel`] is the seam between the pipeline and the hosted model.
//! [`LlmVisionModel`] implements it on top of any `edgequake_llm` provider;
//! tests substitute a scripted model.
//!
//! There is no retry here. A page whose call fails, or whose reply cannot
//! be parsed, is logged and skipped; the rest of the document still counts.

use crate::config::TallyConfig;
use crate::error::PageError;
use crate::output::PageStats;
use crate::pipeline::response::parse_page_stats;
use crate::prompts::JOURNALIST_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// A vision model that reads one page image and answers with text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Return the raw reply text for `image` (1-indexed `page_num`).
    async fn read_page(&self, page_num: usize, image: ImageData) -> Result<String, PageError>;
}

/// [`VisionModel`] backed by an `edgequake_llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    options: CompletionOptions,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &TallyConfig) -> Self {
        Self {
            provider,
            prompt: config
                .prompt
                .clone()
                .unwrap_or_else(|| JOURNALIST_PROMPT.to_string()),
            options: build_options(config),
        }
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    /// One user turn: the page image followed by the instruction text.
    async fn read_page(&self, page_num: usize, image: ImageData) -> Result<String, PageError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user_with_images(&self.prompt, vec![image])];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| PageError::ModelCallFailed {
                page: page_num,
                detail: e.to_string(),
            })?;

        debug!(
            "Page {}: {} input tokens, {} output tokens, {:?}",
            page_num,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &TallyConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Ask the model about one page and parse its reply.
///
/// Returns the parsed stats, `Ok(None)` for a page without journalists, or
/// the [`PageError`] that caused the page to be skipped. Every outcome is
/// logged here so callers only have to record it.
pub async fn analyze_page(
    model: &dyn VisionModel,
    page_num: usize,
    image: ImageData,
) -> Result<Option<PageStats>, PageError> {
    let text = match model.read_page(page_num, image).await {
        Ok(text) => text,
        Err(e) => {
            error!("Error analyzing page {}: {}", page_num, e);
            return Err(e);
        }
    };

    match parse_page_stats(page_num, &text) {
        Ok(Some(stats)) => {
            info!(
                "Found journalists on page {}: {:?}",
                page_num,
                stats.journalist_stats.keys().collect::<Vec<_>>()
            );
            Ok(Some(stats))
        }
        Ok(None) => {
            info!("No journalists found on page {}", page_num);
            Ok(None)
        }
        Err(e) => {
            warn!("{}", e);
            warn!("Raw reply for page {}: {}", page_num, text);
            Err(e)
        }
    }
}
