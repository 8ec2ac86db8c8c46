//! # byline-tally
//!
//! Count journalist bylines in newspaper PDFs with a vision language model.
//!
//! ## Why this crate?
//!
//! Bylines on a printed page are easy for a reader to spot and hard for a
//! text extractor: they sit in multi-column layouts, next to kickers and
//! photo credits, and "EXCLUSIVE" tags are often set as graphics. This crate
//! rasterises each page and lets a VLM read it as a person would, then adds
//! up exclusive and standard articles per journalist.
//!
//! ## Pipeline Overview
//!
//! ```text
//! storage finalize event
//!  │
//!  ├─ 1. Trigger    skip anything that is not a .pdf
//!  ├─ 2. Download   blob → TempDir, %PDF magic check
//!  ├─ 3. Render     rasterise pages via pdfium (spawn_blocking)
//!  ├─ 4. Analyse    one VLM call per page, strictly in order
//!  ├─ 5. Aggregate  per-journalist totals + pages seen
//!  ├─ 6. Persist    processed_pdfs/{date}_{file} in the Realtime Database
//!  └─ 7. Sheets     one row per journalist, up to 3 attempts
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use byline_tally::{extract_input, TallyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider from ANTHROPIC_API_KEY or EDGEQUAKE_LLM_PROVIDER/EDGEQUAKE_MODEL
//!     let config = TallyConfig::default();
//!     let output = extract_input("afr-2024-11-07.pdf", &config).await?;
//!     for (name, stat) in output.tally.iter() {
//!         println!("{name}: {} exclusive, {} standard", stat.exclusive, stat.standard);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `byline-tally` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when embedding the handler in another service:
//! ```toml
//! byline-tally = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod extract;
pub mod leaderboard;
pub mod output;
pub mod pipeline;
pub mod points;
pub mod progress;
pub mod prompts;
pub mod sheets;
pub mod storage;
pub mod trigger;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{SheetsConfig, TallyConfig, TallyConfigBuilder, DEFAULT_MODEL};
pub use database::{MemoryStore, RealtimeDatabase, ResultStore};
pub use error::{PageError, SheetsError, TallyError};
pub use extract::{extract_input, Extractor};
pub use output::{
    ErrorRecord, ExtractionOutput, ExtractionStats, JournalistStat, JournalistTally, PageOutcome,
    PageStats, ProcessingResult, SheetsSync, SyncStatus,
};
pub use pipeline::llm::VisionModel;
pub use pipeline::render::PageRenderer;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use sheets::{sync_to_sheets, GoogleSheets, SheetsApi};
pub use storage::{BlobStore, GcsBlobStore, LocalBlobStore};
pub use trigger::{is_pdf_object, StorageEvent, TriggerHandler, TriggerOutcome};
