//! Input resolution: turn a CLI argument (path or URL) into a local PDF.
//!
//! pdfium needs a file-system path, so URLs are downloaded into a `TempDir`
//! that is removed when [`ResolvedInput`] is dropped. Every input is checked
//! for the `%PDF` magic bytes before rendering so a stray HTML error page
//! fails with [`TallyError::NotAPdf`] instead of a pdfium parse error.

use crate::error::TallyError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the `TempDir` keeps the download alive.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, TallyError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        let path = PathBuf::from(input);
        check_pdf_file(&path)?;
        debug!("Resolved local PDF: {}", path.display());
        Ok(ResolvedInput::Local(path))
    }
}

/// Validate that `path` exists, is readable and starts with `%PDF`.
pub fn check_pdf_file(path: &Path) -> Result<(), TallyError> {
    if !path.exists() {
        return Err(TallyError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                return Err(TallyError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(TallyError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(TallyError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, TallyError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| TallyError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TallyError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| TallyError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| TallyError::Internal(format!("Failed to write temp file: {}", e)))?;

    check_pdf_file(&file_path)?;
    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}
