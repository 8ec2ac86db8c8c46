//! Blob access: fetch an uploaded object into a local file.
//!
//! pdfium needs a path on disk, so the trigger handler downloads every
//! object into its own `TempDir` before rendering.

use crate::auth::TokenSource;
use crate::error::TallyError;
use async_trait::async_trait;
use reqwest::Url;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const GCS_API_BASE: &str = "https://storage.googleapis.com/storage/v1";

/// Read access to a bucket of uploaded objects.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write the object `bucket/name` to `dest`, returning the byte count.
    async fn download(&self, bucket: &str, name: &str, dest: &Path) -> Result<u64, TallyError>;
}

/// Cloud Storage JSON API.
pub struct GcsBlobStore {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    base_url: String,
}

impl GcsBlobStore {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            base_url: GCS_API_BASE.to_string(),
        }
    }

    /// Point at a different API root (emulators).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// `{base}/b/{bucket}/o/{name}?alt=media` with `name` as one encoded segment.
    pub fn media_url(&self, bucket: &str, name: &str) -> Result<Url, TallyError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| TallyError::InvalidConfig(format!("bad storage URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| TallyError::InvalidConfig(format!("bad storage URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["b", bucket, "o", name]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn download(&self, bucket: &str, name: &str, dest: &Path) -> Result<u64, TallyError> {
        let failed = |reason: String| TallyError::BlobDownloadFailed {
            bucket: bucket.to_string(),
            name: name.to_string(),
            reason,
        };

        let url = self.media_url(bucket, name)?;
        let token = self.tokens.access_token().await?;
        debug!("GET {}", url);

        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {status}: {body}")));
        }

        let bytes = resp.bytes().await.map_err(|e| failed(e.to_string()))?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| TallyError::Internal(format!("Failed to write temp file: {e}")))?;
        info!("Downloaded gs://{}/{} ({} bytes)", bucket, name, bytes.len());
        Ok(bytes.len() as u64)
    }
}

/// Reads `root/{bucket}/{name}` from the local file system.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `root/{bucket}/{name}`. Names that are absolute or contain `..`
    /// would leave `root` and are rejected.
    pub fn object_path(&self, bucket: &str, name: &str) -> Result<PathBuf, TallyError> {
        let relative = Path::new(bucket).join(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(TallyError::BlobDownloadFailed {
                bucket: bucket.to_string(),
                name: name.to_string(),
                reason: "object path leaves the local root".into(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn download(&self, bucket: &str, name: &str, dest: &Path) -> Result<u64, TallyError> {
        let src = self.object_path(bucket, name)?;
        tokio::fs::copy(&src, dest)
            .await
            .map_err(|e| TallyError::BlobDownloadFailed {
                bucket: bucket.to_string(),
                name: name.to_string(),
                reason: format!("{}: {e}", src.display()),
            })
    }
}
