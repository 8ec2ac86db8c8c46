//! Document-level extraction: PDF on disk → [`ExtractionOutput`].
//!
//! [`Extractor`] strings the pipeline stages together for one document.
//! Pages are analysed strictly one after another: each model call is
//! awaited before the next page is sent.

use crate::config::{TallyConfig, DEFAULT_MODEL};
use crate::error::{PageError, TallyError};
use crate::output::{ExtractionOutput, ExtractionStats, JournalistTally, PageOutcome, PageStats};
use crate::pipeline::llm::{analyze_page, LlmVisionModel, VisionModel};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::{encode, input};
use edgequake_llm::{ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Renders a PDF, reads every page with the vision model and tallies bylines.
#[derive(Clone)]
pub struct Extractor {
    renderer: Arc<dyn PageRenderer>,
    model: Arc<dyn VisionModel>,
    config: TallyConfig,
}

impl Extractor {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        model: Arc<dyn VisionModel>,
        config: TallyConfig,
    ) -> Self {
        Self {
            renderer,
            model,
            config,
        }
    }

    /// pdfium renderer plus the provider resolved from `config` and the environment.
    pub fn from_config(config: TallyConfig) -> Result<Self, TallyError> {
        let provider = resolve_provider(&config)?;
        let model = LlmVisionModel::new(provider, &config);
        Ok(Self::new(
            Arc::new(PdfiumRenderer::from_config(&config)),
            Arc::new(model),
            config,
        ))
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Extract journalist stats from a local PDF.
    ///
    /// # Errors
    /// Returns `Err(TallyError)` only when the document cannot be rendered.
    /// Page-level failures are recorded in [`ExtractionOutput::pages`] and
    /// leave the tally untouched.
    pub async fn extract(&self, pdf_path: &Path) -> Result<ExtractionOutput, TallyError> {
        let total_start = Instant::now();
        info!("Starting extraction: {}", pdf_path.display());

        // ── Step 1: Rasterise pages ──────────────────────────────────────
        let render_start = Instant::now();
        let rendered = self.renderer.render_all(pdf_path).await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;
        info!("Rendered {} pages in {}ms", rendered.len(), render_duration_ms);

        // ── Step 2: Encode images to base64 ──────────────────────────────
        let encoded: Vec<(usize, Result<ImageData, PageError>)> = rendered
            .iter()
            .map(|(idx, img)| (idx + 1, encode::encode_page(idx + 1, img)))
            .collect();
        drop(rendered);

        // ── Step 3: Read pages one at a time ─────────────────────────────
        let llm_start = Instant::now();
        let (tally, pages) = self.tally_pages(encoded).await;
        let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

        let stats = ExtractionStats {
            total_pages: pages.len(),
            pages_with_bylines: pages.iter().filter(|p| p.journalists > 0).count(),
            empty_pages: pages
                .iter()
                .filter(|p| p.error.is_none() && p.journalists == 0)
                .count(),
            failed_pages: pages.iter().filter(|p| p.error.is_some()).count(),
            render_duration_ms,
            llm_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Extraction complete: {} journalists across {}/{} pages, {}ms total",
            tally.len(),
            stats.pages_with_bylines,
            stats.total_pages,
            stats.total_duration_ms
        );

        Ok(ExtractionOutput {
            tally,
            pages,
            stats,
        })
    }

    /// Analyse already-encoded pages in order and fold them into a tally.
    ///
    /// `pages` holds `(page_num_1based, encoded image or encode error)`.
    pub async fn tally_pages(
        &self,
        pages: Vec<(usize, Result<ImageData, PageError>)>,
    ) -> (JournalistTally, Vec<PageOutcome>) {
        let total = pages.len();
        let cb = self.config.progress_callback.clone();
        if let Some(ref cb) = cb {
            cb.on_extraction_start(total);
        }

        let model = Arc::clone(&self.model);
        let outcomes: Vec<(usize, Result<Option<PageStats>, PageError>)> =
            stream::iter(pages)
                .then(|(page_num, encoded)| {
                    let model = Arc::clone(&model);
                    let cb = cb.clone();
                    async move {
                        if let Some(ref cb) = cb {
                            cb.on_page_start(page_num, total);
                        }
                        let result = match encoded {
                            Ok(img) => analyze_page(model.as_ref(), page_num, img).await,
                            Err(e) => {
                                warn!("Failed to encode page {}: {}", page_num, e);
                                Err(e)
                            }
                        };
                        if let Some(ref cb) = cb {
                            match &result {
                                Ok(stats) => cb.on_page_complete(
                                    page_num,
                                    total,
                                    stats.as_ref().map_or(0, |s| s.journalist_stats.len()),
                                ),
                                Err(e) => cb.on_page_skipped(page_num, total, e.to_string()),
                            }
                        }
                        (page_num, result)
                    }
                })
                .collect()
                .await;

        let mut tally = JournalistTally::default();
        let mut report = Vec::with_capacity(outcomes.len());
        for (page_num, result) in outcomes {
            match result {
                Ok(Some(stats)) => {
                    tally.add_page(page_num, &stats);
                    report.push(PageOutcome {
                        page_num,
                        journalists: stats.journalist_stats.len(),
                        error: None,
                    });
                }
                Ok(None) => report.push(PageOutcome {
                    page_num,
                    journalists: 0,
                    error: None,
                }),
                Err(e) => report.push(PageOutcome {
                    page_num,
                    journalists: 0,
                    error: Some(e),
                }),
            }
        }
        debug!("Tallied {} journalists from {} pages", tally.len(), total);

        if let Some(ref cb) = cb {
            cb.on_extraction_complete(total, tally.len());
        }
        (tally, report)
    }
}

/// Extract from a local path or HTTP(S) URL using pdfium and the configured provider.
pub async fn extract_input(
    input_str: impl AsRef<str>,
    config: &TallyConfig,
) -> Result<ExtractionOutput, TallyError> {
    let resolved =
        input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let extractor = Extractor::from_config(config.clone())?;
    extractor.extract(resolved.path()).await
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, TallyError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TallyError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or [`DEFAULT_MODEL`].
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **`ANTHROPIC_API_KEY`** present → anthropic with the configured or default model.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &TallyConfig) -> Result<Arc<dyn LLMProvider>, TallyError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        if !key.is_empty() {
            return create_vision_provider("anthropic", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TallyError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY (or another provider key).\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
