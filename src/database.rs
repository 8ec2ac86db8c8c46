//! Result persistence in the Realtime Database.
//!
//! Writes are unconditional overwrites: a re-upload of the same file on
//! the same day replaces the earlier result. Keys are built by
//! [`processed_key`] and [`error_key`].

use crate::auth::TokenSource;
use crate::error::TallyError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Characters the Realtime Database refuses in a key.
const ILLEGAL_KEY_CHARS: &[char] = &['.', '$', '#', '[', ']', '/'];

/// A JSON tree addressed by slash-separated paths.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Overwrite the value at `path`.
    async fn set(&self, path: &str, value: &Value) -> Result<(), TallyError>;

    /// Value at `path`, or `None` when nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>, TallyError>;
}

/// Replace every character that is illegal in a database key with `_`.
pub fn sanitize_key_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if ILLEGAL_KEY_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// `processed_pdfs/{YYYY-MM-DD}_{basename}` for an object path.
pub fn processed_key(date: NaiveDate, object_path: &str) -> String {
    let basename = object_path.rsplit('/').next().unwrap_or(object_path);
    format!(
        "processed_pdfs/{}_{}",
        date.format("%Y-%m-%d"),
        sanitize_key_segment(basename)
    )
}

/// `processing_errors/error_{YYYYmmdd_HHMMSS}`.
pub fn error_key(now: DateTime<Utc>) -> String {
    format!("processing_errors/error_{}", now.format("%Y%m%d_%H%M%S"))
}

// ── REST client ──────────────────────────────────────────────────────────

/// Firebase Realtime Database over its REST API.
pub struct RealtimeDatabase {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl RealtimeDatabase {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            tokens,
        }
    }

    /// `{base}/{path}.json`, without the token. Each path segment is
    /// percent-encoded on its own.
    pub fn node_url(&self, path: &str) -> Result<Url, TallyError> {
        let bad_url = || TallyError::InvalidConfig(format!("bad database URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| bad_url())?;

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (parents, last) = match segments.split_last() {
            Some((last, parents)) => (parents, format!("{last}.json")),
            None => (&[][..], ".json".to_string()),
        };
        url.path_segments_mut()
            .map_err(|_| bad_url())?
            .pop_if_empty()
            .extend(parents)
            .push(&last);
        Ok(url)
    }

    async fn authorized_url(&self, path: &str) -> Result<Url, TallyError> {
        let mut url = self.node_url(path)?;
        let token = self.tokens.access_token().await?;
        url.query_pairs_mut().append_pair("access_token", &token);
        Ok(url)
    }
}

#[async_trait]
impl ResultStore for RealtimeDatabase {
    async fn set(&self, path: &str, value: &Value) -> Result<(), TallyError> {
        let failed = |reason: String| TallyError::DatabaseWrite {
            path: path.to_string(),
            reason,
        };
        let url = self.authorized_url(path).await?;
        let resp = self
            .client
            .put(url)
            .json(value)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {status}: {body}")));
        }
        debug!("Wrote /{}", path);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, TallyError> {
        let failed = |reason: String| TallyError::DatabaseRead {
            path: path.to_string(),
            reason,
        };
        let url = self.authorized_url(path).await?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {status}: {body}")));
        }
        let value: Value = resp.json().await.map_err(|e| failed(e.to_string()))?;
        Ok((!value.is_null()).then_some(value))
    }
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Flat map of full paths to values. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far, keyed by path.
    pub async fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries.lock().await.clone()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn set(&self, path: &str, value: &Value) -> Result<(), TallyError> {
        self.entries
            .lock()
            .await
            .insert(path.trim_matches('/').to_string(), value.clone());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, TallyError> {
        Ok(self.entries.lock().await.get(path.trim_matches('/')).cloned())
    }
}
