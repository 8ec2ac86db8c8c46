//! Data types produced by extraction and written to the destinations.
//!
//! Field names on the database-facing types ([`ProcessingResult`],
//! [`ErrorRecord`], [`SheetsSync`]) are fixed by the dashboard that reads
//! them, hence the mix of camelCase and snake_case keys.

use crate::error::PageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Model reply ──────────────────────────────────────────────────────────

/// Byline counts for one journalist on one page, as returned by the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCounts {
    #[serde(default)]
    pub exclusive: u64,
    #[serde(default)]
    pub standard: u64,
}

/// Parsed model reply for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStats {
    #[serde(default)]
    pub journalist_stats: BTreeMap<String, PageCounts>,
}

impl PageStats {
    /// Convenience constructor, mostly for tests and fixtures.
    pub fn from_counts<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u64, u64)>,
        S: Into<String>,
    {
        Self {
            journalist_stats: entries
                .into_iter()
                .map(|(name, exclusive, standard)| {
                    (name.into(), PageCounts { exclusive, standard })
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.journalist_stats.is_empty()
    }
}

// ── Aggregate ────────────────────────────────────────────────────────────

/// Running totals for one journalist across a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalistStat {
    pub exclusive: u64,
    pub standard: u64,
    /// 1-indexed pages the journalist appeared on, first-seen order, no duplicates.
    #[serde(default)]
    pub pages: Vec<usize>,
}

/// Per-journalist totals for one document, keyed by the exact name the
/// model returned. See [`crate::pipeline::aggregate`] for the operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalistTally {
    #[serde(default)]
    pub journalist_stats: BTreeMap<String, JournalistStat>,
}

// ── Extraction report ────────────────────────────────────────────────────

/// What happened to one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Journalists counted on this page (0 for empty or failed pages).
    pub journalists: usize,
    /// Set when the page was skipped because of an error.
    pub error: Option<PageError>,
}

/// Aggregate numbers for one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub pages_with_bylines: usize,
    pub empty_pages: usize,
    pub failed_pages: usize,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of [`crate::extract::Extractor::extract`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub tally: JournalistTally,
    pub pages: Vec<PageOutcome>,
    pub stats: ExtractionStats,
}

// ── Database records ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingDetails {
    /// Wall-clock seconds, stored as a string.
    #[serde(rename = "processingTime")]
    pub processing_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

/// Outcome of the spreadsheet append, attached to the returned result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetsSync {
    pub status: SyncStatus,
    pub timestamp: DateTime<Utc>,
}

impl SheetsSync {
    pub fn from_outcome(ok: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            status: if ok { SyncStatus::Success } else { SyncStatus::Failed },
            timestamp,
        }
    }
}

/// The object written to `processed_pdfs/{key}` once per upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub status: ProcessingStatus,
    pub processed_at: DateTime<Utc>,
    pub file_name: String,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
    #[serde(rename = "processing_details")]
    pub processing_details: ProcessingDetails,
    pub results: JournalistTally,
    #[serde(rename = "sheets_sync", default, skip_serializing_if = "Option::is_none")]
    pub sheets_sync: Option<SheetsSync>,
}

/// The object written to `processing_errors/{key}` when an upload fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub file_name: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn processing_result_wire_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 11, 7, 6, 37, 53).unwrap();
        let mut tally = JournalistTally::default();
        tally.journalist_stats.insert(
            "Alice".into(),
            JournalistStat {
                exclusive: 1,
                standard: 2,
                pages: vec![1, 2],
            },
        );
        let result = ProcessingResult {
            status: ProcessingStatus::Processed,
            processed_at: ts,
            file_name: "uploads/afr.pdf".into(),
            file_size: 1024,
            uploaded_at: ts,
            processing_details: ProcessingDetails {
                processing_time: "3.5".into(),
            },
            results: tally,
            sheets_sync: None,
        };

        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["status"], "processed");
        assert_eq!(v["fileName"], "uploads/afr.pdf");
        assert_eq!(v["fileSize"], 1024);
        assert_eq!(v["processing_details"]["processingTime"], "3.5");
        assert_eq!(
            v["results"]["journalist_stats"]["Alice"],
            json!({"exclusive": 1, "standard": 2, "pages": [1, 2]})
        );
        assert!(v.get("sheets_sync").is_none());
        assert!(v["processedAt"].as_str().unwrap().starts_with("2024-11-07T06:37:53"));
    }

    #[test]
    fn sheets_sync_status_is_lowercase() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let v = serde_json::to_value(SheetsSync::from_outcome(false, ts)).unwrap();
        assert_eq!(v["status"], "failed");
    }

    #[test]
    fn page_counts_default_missing_fields_to_zero() {
        let c: PageCounts = serde_json::from_value(json!({"exclusive": 2})).unwrap();
        assert_eq!(c, PageCounts { exclusive: 2, standard: 0 });
    }
}
