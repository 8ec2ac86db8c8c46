//! Storage-finalize entry point.
//!
//! [`TriggerHandler::handle`] runs once per uploaded object:
//!
//! ```text
//! event ─▶ pdf? ─▶ download ─▶ extract ─▶ DB write ─▶ sheets append
//!           │                     │
//!           └─ skip (no writes)   └─ on failure: error record, then Err
//! ```
//!
//! The database result is written before the spreadsheet sync runs, so the
//! stored object never carries `sheets_sync`; only the returned one does.

use crate::config::SheetsConfig;
use crate::database::{error_key, processed_key, ResultStore};
use crate::error::TallyError;
use crate::extract::Extractor;
use crate::output::{
    ErrorRecord, ExtractionStats, ProcessingDetails, ProcessingResult, ProcessingStatus,
    SheetsSync,
};
use crate::pipeline::input::check_pdf_file;
use crate::sheets::{sync_to_sheets, SheetsApi};
use crate::storage::BlobStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{error, info};

/// Local name of the downloaded object inside its temp dir.
const DOWNLOAD_FILE_NAME: &str = "upload.pdf";

// ── Event ────────────────────────────────────────────────────────────────

/// The object fields of a storage finalize notification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEvent {
    pub bucket: String,
    pub name: String,
    /// Object size in bytes; storage sends it as a decimal string.
    #[serde(default, deserialize_with = "size_from_string_or_number")]
    pub size: u64,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content_type: Option<String>,
}

fn size_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
        Null(()),
    }

    match Size::deserialize(deserializer)? {
        Size::Number(n) => Ok(n),
        Size::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Size::Null(()) => Ok(0),
    }
}

impl StorageEvent {
    /// Parse a CloudEvent envelope (`{"data": {...}}`) or bare object data.
    pub fn from_json(json: &str) -> Result<Self, TallyError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| TallyError::InvalidEvent(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(mut value: Value) -> Result<Self, TallyError> {
        if let Some(data) = value.get_mut("data").filter(|d| d.is_object()) {
            value = data.take();
        }
        serde_json::from_value(value).map_err(|e| TallyError::InvalidEvent(e.to_string()))
    }

    /// Last path segment of the object name.
    pub fn basename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Case-insensitive `.pdf` suffix check.
pub fn is_pdf_object(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
}

// ── Handler ──────────────────────────────────────────────────────────────

/// What [`TriggerHandler::handle`] did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Not a PDF; nothing was downloaded or written.
    Skipped { name: String },
    /// Result stored at `key`.
    Processed {
        key: String,
        result: ProcessingResult,
        stats: ExtractionStats,
    },
}

struct SheetsTarget {
    api: Arc<dyn SheetsApi>,
    config: SheetsConfig,
}

/// Wires blob access, extraction and the two destinations together.
pub struct TriggerHandler {
    blobs: Arc<dyn BlobStore>,
    store: Arc<dyn ResultStore>,
    extractor: Extractor,
    sheets: Option<SheetsTarget>,
}

impl TriggerHandler {
    pub fn new(blobs: Arc<dyn BlobStore>, store: Arc<dyn ResultStore>, extractor: Extractor) -> Self {
        Self {
            blobs,
            store,
            extractor,
            sheets: None,
        }
    }

    /// Append rows to a spreadsheet after each stored result.
    pub fn with_sheets(mut self, api: Arc<dyn SheetsApi>, config: SheetsConfig) -> Self {
        self.sheets = Some(SheetsTarget { api, config });
        self
    }

    /// Process one finalize event.
    ///
    /// # Errors
    /// Download, validation, rendering and database-write failures are
    /// recorded under `processing_errors/` and then returned. A spreadsheet
    /// failure is not an error; it shows up as `sheets_sync.status = failed`.
    pub async fn handle(&self, event: &StorageEvent) -> Result<TriggerOutcome, TallyError> {
        info!("Function triggered for gs://{}/{}", event.bucket, event.name);

        if !is_pdf_object(&event.name) {
            info!("Skipping non-PDF file: {}", event.name);
            return Ok(TriggerOutcome::Skipped {
                name: event.name.clone(),
            });
        }

        let (key, mut result, stats) = match self.process(event).await {
            Ok(processed) => processed,
            Err(e) => {
                error!("Error processing PDF {}: {}", event.name, e);
                self.record_failure(event, &e).await;
                return Err(e);
            }
        };
        info!("Processing complete for: {}", event.name);
        info!("Result stored with key: {}", key);

        if let Some(target) = &self.sheets {
            let date = result.processed_at.format("%Y-%m-%d").to_string();
            let synced = match serde_json::to_value(&result.results) {
                Ok(results) => sync_to_sheets(target.api.as_ref(), &results, &date, &target.config).await,
                Err(e) => {
                    error!("Could not serialise results for sheets: {}", e);
                    false
                }
            };
            result.sheets_sync = Some(SheetsSync::from_outcome(synced, Utc::now()));
        }

        Ok(TriggerOutcome::Processed { key, result, stats })
    }

    async fn process(
        &self,
        event: &StorageEvent,
    ) -> Result<(String, ProcessingResult, ExtractionStats), TallyError> {
        let start = Instant::now();

        let temp_dir = TempDir::new().map_err(|e| TallyError::Internal(e.to_string()))?;
        // Object names can exceed the local file name limit.
        let pdf_path = temp_dir.path().join(DOWNLOAD_FILE_NAME);
        let downloaded = self.blobs.download(&event.bucket, &event.name, &pdf_path).await?;
        check_pdf_file(&pdf_path)?;

        let output = self.extractor.extract(&pdf_path).await?;
        drop(temp_dir);

        let processed_at = Utc::now();
        let result = ProcessingResult {
            status: ProcessingStatus::Processed,
            processed_at,
            file_name: event.name.clone(),
            file_size: if event.size > 0 { event.size } else { downloaded },
            uploaded_at: event.time_created.unwrap_or(processed_at),
            processing_details: ProcessingDetails {
                processing_time: start.elapsed().as_secs_f64().to_string(),
            },
            results: output.tally,
            sheets_sync: None,
        };

        let key = processed_key(processed_at.date_naive(), &event.name);
        let value = serde_json::to_value(&result).map_err(|e| TallyError::Internal(e.to_string()))?;
        self.store.set(&key, &value).await?;
        Ok((key, result, output.stats))
    }

    /// Best effort: a failed error write is logged and otherwise ignored.
    async fn record_failure(&self, event: &StorageEvent, err: &TallyError) {
        let now = Utc::now();
        let record = ErrorRecord {
            file_name: event.name.clone(),
            error: err.to_string(),
            timestamp: now,
        };
        let key = error_key(now);
        let written = match serde_json::to_value(&record) {
            Ok(value) => self.store.set(&key, &value).await,
            Err(e) => Err(TallyError::Internal(e.to_string())),
        };
        if let Err(write_err) = written {
            error!("Could not record failure at {}: {}", key, write_err);
        }
    }
}
