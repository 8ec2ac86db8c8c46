//! Error types for the byline-tally library.
//!
//! Three error types match the three failure domains of an upload:
//!
//! * [`TallyError`]: **fatal**. The upload cannot be processed at all (blob
//!   download failed, PDF is corrupt, the database rejected the write). The
//!   trigger handler records it under `processing_errors/` and returns it so
//!   the platform marks the invocation failed.
//!
//! * [`PageError`]: **non-fatal**. One page could not be read (image
//!   encoding glitch, model call failed, reply was not JSON). The page is
//!   logged and left out of the tally; every other page still counts.
//!
//! * [`SheetsError`]: the spreadsheet append failed. It never escapes
//!   [`crate::sheets::sync_to_sheets`], which turns it into `false`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the byline-tally library.
#[derive(Debug, Error)]
pub enum TallyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Storage trigger errors ────────────────────────────────────────────
    /// The storage event payload could not be decoded.
    #[error("Invalid storage event: {0}")]
    InvalidEvent(String),

    /// The uploaded object could not be fetched from its bucket.
    #[error("Failed to download gs://{bucket}/{name}: {reason}")]
    BlobDownloadFailed {
        bucket: String,
        name: String,
        reason: String,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Destination errors ────────────────────────────────────────────────
    /// The realtime database rejected or failed a write.
    #[error("Database write to '{path}' failed: {reason}")]
    DatabaseWrite { path: String, reason: String },

    /// The realtime database could not be read.
    #[error("Database read from '{path}' failed: {reason}")]
    DatabaseRead { path: String, reason: String },

    /// An OAuth2 access token could not be obtained.
    #[error("Authentication failed: {0}")]
    Auth(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The page is excluded from the tally; processing continues with the next one.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The rendered page could not be PNG-encoded.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The model call itself failed (network, auth, quota).
    #[error("Page {page}: model call failed: {detail}")]
    ModelCallFailed { page: usize, detail: String },

    /// The model answered, but not with the expected JSON object.
    #[error("Page {page}: unparsable model reply: {detail}")]
    UnparsableResponse {
        page: usize,
        detail: String,
        raw: String,
    },
}

impl PageError {
    /// 1-indexed page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::EncodeFailed { page, .. }
            | PageError::ModelCallFailed { page, .. }
            | PageError::UnparsableResponse { page, .. } => *page,
        }
    }
}

/// Failure of a single spreadsheet append attempt.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// The results object did not have the shape the sheet expects.
    #[error("Invalid results structure: {0}")]
    Validation(#[from] crate::sheets::ValidationError),

    /// The Sheets API answered with a non-success status.
    #[error("Sheets API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The request never reached the API or the reply was unreadable.
    #[error("Sheets request failed: {0}")]
    Transport(String),

    /// No access token for the Sheets scope.
    #[error("Sheets authentication failed: {0}")]
    Auth(String),
}
