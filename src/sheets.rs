//! Spreadsheet sync: one appended row per journalist.
//!
//! The sheet's own formulas compute points, so the front-page and
//! daily-points columns are written as `0`.
//!
//! Row layout:
//!
//! ```text
//! [date, id, name, publication, front_page=0, exclusive, standard, daily_points=0]
//! ```
//!
//! [`sync_to_sheets`] never fails: validation and API errors are logged and
//! reported as `false` so a broken sheet cannot undo a stored result.

use crate::auth::TokenSource;
use crate::config::SheetsConfig;
use crate::error::SheetsError;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Url;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const ROW_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROW_ID_LEN: usize = 5;

/// Why a results object was refused before any append.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("results must be a JSON object")]
    NotAnObject,

    #[error("missing 'journalist_stats'")]
    MissingJournalistStats,

    #[error("'journalist_stats' must be an object")]
    StatsNotAnObject,

    #[error("entry for '{name}' must be an object")]
    EntryNotAnObject { name: String },

    #[error("'{field}' for '{name}' is not a number")]
    NonNumericCount { name: String, field: &'static str },
}

/// Check that `results` has the shape the sheet expects.
///
/// A missing count is accepted and written as 0.
pub fn validate_results(results: &Value) -> Result<(), ValidationError> {
    let obj = results.as_object().ok_or(ValidationError::NotAnObject)?;
    let stats = obj
        .get("journalist_stats")
        .ok_or(ValidationError::MissingJournalistStats)?
        .as_object()
        .ok_or(ValidationError::StatsNotAnObject)?;

    for (name, entry) in stats {
        let entry = entry
            .as_object()
            .ok_or_else(|| ValidationError::EntryNotAnObject { name: name.clone() })?;
        for field in ["exclusive", "standard"] {
            if entry.get(field).is_some_and(|v| !v.is_number()) {
                return Err(ValidationError::NonNumericCount {
                    name: name.clone(),
                    field,
                });
            }
        }
    }
    Ok(())
}

/// Random row identifier: five characters from `A-Z0-9`.
pub fn row_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROW_ID_LEN)
        .map(|_| ROW_ID_ALPHABET[rng.gen_range(0..ROW_ID_ALPHABET.len())] as char)
        .collect()
}

/// Rows for an already validated results object, in journalist order.
pub fn build_rows<R: Rng + ?Sized>(
    results: &Value,
    date: &str,
    publication: &str,
    rng: &mut R,
) -> Vec<Vec<Value>> {
    let Some(stats) = results.get("journalist_stats").and_then(Value::as_object) else {
        return Vec::new();
    };
    stats
        .iter()
        .map(|(name, entry)| {
            let count = |field: &str| entry.get(field).cloned().unwrap_or_else(|| json!(0));
            vec![
                json!(date),
                json!(row_id(rng)),
                json!(name),
                json!(publication),
                json!(0),
                count("exclusive"),
                count("standard"),
                json!(0),
            ]
        })
        .collect()
}

// ── API ──────────────────────────────────────────────────────────────────

/// Append-only access to a spreadsheet.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Append `rows` after `range` as user-entered values, inserting new rows.
    async fn append(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<Value>],
    ) -> Result<(), SheetsError>;
}

/// Sheets v4 REST API (`spreadsheets.values.append`).
pub struct GoogleSheets {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    base_url: String,
}

impl GoogleSheets {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            base_url: SHEETS_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// `{base}/{id}/values/{range}:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS`
    pub fn append_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url, SheetsError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SheetsError::Transport(format!("bad Sheets URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Transport(format!("bad Sheets URL: {}", self.base_url)))?
            .pop_if_empty()
            .push(spreadsheet_id)
            .push("values")
            .push(&format!("{range}:append"));
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }
}

#[async_trait]
impl SheetsApi for GoogleSheets {
    async fn append(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<Value>],
    ) -> Result<(), SheetsError> {
        let url = self.append_url(spreadsheet_id, range)?;
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| SheetsError::Auth(e.to_string()))?;

        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "values": rows }))
            .send()
            .await
            .map_err(|e| SheetsError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SheetsError::Api {
                status: status.as_u16(),
                body,
            });
        }
        debug!("Sheets append response: {}", body);
        Ok(())
    }
}

// ── Sync ─────────────────────────────────────────────────────────────────

/// Validate, build rows and append with retries.
///
/// Makes up to `config.max_attempts` attempts and sleeps
/// [`SheetsConfig::backoff_after`] between them. Returns the number of rows
/// appended.
pub async fn append_results(
    api: &dyn SheetsApi,
    results: &Value,
    date: &str,
    config: &SheetsConfig,
) -> Result<usize, SheetsError> {
    validate_results(results)?;
    let rows = build_rows(results, date, &config.publication, &mut rand::thread_rng());
    let max_attempts = config.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        match api.append(&config.spreadsheet_id, &config.range, &rows).await {
            Ok(()) => {
                info!(
                    "Synced {} rows to spreadsheet {} ({})",
                    rows.len(),
                    config.spreadsheet_id,
                    config.range
                );
                return Ok(rows.len());
            }
            Err(e) if attempt + 1 < max_attempts => {
                warn!("Retry {}/{} failed: {}", attempt + 1, max_attempts, e);
                tokio::time::sleep(config.backoff_after(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// [`append_results`], reduced to success or failure.
pub async fn sync_to_sheets(
    api: &dyn SheetsApi,
    results: &Value,
    date: &str,
    config: &SheetsConfig,
) -> bool {
    match append_results(api, results, date, config).await {
        Ok(_) => true,
        Err(e) => {
            error!("Error syncing to Google Sheets: {}", e);
            false
        }
    }
}
