//! Configuration types for byline extraction and publishing.
//!
//! [`TallyConfig`] controls how pages are rendered and read by the model,
//! built via its [`TallyConfigBuilder`]. [`SheetsConfig`] names the
//! spreadsheet destination and its retry policy. Database location and
//! credentials live with the clients that use them
//! ([`crate::database::RealtimeDatabase`], [`crate::auth`]).

use crate::error::TallyError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model used when the provider is inferred from `ANTHROPIC_API_KEY`.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Configuration for extracting journalist stats from one PDF.
///
/// # Example
/// ```rust
/// use byline_tally::TallyConfig;
///
/// let config = TallyConfig::builder()
///     .model("claude-3-5-sonnet-20241022")
///     .max_tokens(1000)
///     .build()
///     .unwrap();
/// assert_eq!(config.temperature, 0.0);
/// ```
#[derive(Clone)]
pub struct TallyConfig {
    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Broadsheet pages are large; the cap keeps the PNG under typical
    /// upload limits while small bylines stay legible.
    pub max_rendered_pixels: u32,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`] or the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic", "openai").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 1000.
    ///
    /// The reply is a small JSON object; a tight budget bounds cost when the
    /// model ignores the format and starts transcribing the page.
    pub max_tokens: usize,

    /// Instruction sent with every page. If None, uses
    /// [`crate::prompts::JOURNALIST_PROMPT`].
    pub prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 2000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 1000,
            prompt: None,
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TallyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TallyConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl TallyConfig {
    /// Create a new builder for `TallyConfig`.
    pub fn builder() -> TallyConfigBuilder {
        TallyConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TallyConfig`].
#[derive(Debug)]
pub struct TallyConfigBuilder {
    config: TallyConfig,
}

impl TallyConfigBuilder {
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
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

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TallyConfig, TallyError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(TallyError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if let Some(ref p) = c.prompt {
            if p.trim().is_empty() {
                return Err(TallyError::InvalidConfig("prompt must not be empty".into()));
            }
        }
        Ok(self.config)
    }
}

// ── Spreadsheet destination ──────────────────────────────────────────────

/// Where and how journalist rows are appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// Target spreadsheet identifier (the long id in the sheet URL).
    pub spreadsheet_id: String,

    /// A1-notation range rows are appended after. Default: `New Data!A2`.
    pub range: String,

    /// Publication label written in the fourth column. Default: `AFR`.
    pub publication: String,

    /// Total append attempts before giving up. Default: 3.
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles each time. Default: 1000.
    pub backoff_ms: u64,
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            range: "New Data!A2".to_string(),
            publication: "AFR".to_string(),
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }

    pub fn with_publication(mut self, publication: impl Into<String>) -> Self {
        self.publication = publication.into();
        self
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn with_backoff_ms(mut self, ms: u64) -> Self {
        self.backoff_ms = ms;
        self
    }

    /// Sleep after failed attempt `attempt` (0-indexed): `backoff_ms * 2^attempt`.
    pub fn backoff_after(&self, attempt: u32) -> std::time::Duration {
        std::time::Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}
