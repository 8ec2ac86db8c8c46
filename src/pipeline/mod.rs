//! Pipeline stages for byline extraction.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ response ──▶ aggregate
//! (path)    (pdfium)   (base64)   (VLM)   (JSON)       (totals)
//! ```
//!
//! 1. [`input`]  canonicalise a path or URL to a local, magic-checked PDF
//! 2. [`render`]  rasterise every page; blocking work in `spawn_blocking`
//! 3. [`encode`]  PNG-encode and base64-wrap each page image
//! 4. [`llm`]  one model call per page, no retry
//! 5. [`response`]  strip wrappers and parse the reply into `PageStats`
//! 6. [`aggregate`]  sum counts per journalist, record pages

pub mod aggregate;
pub mod encode;
pub mod input;
pub mod llm;
pub mod render;
pub mod response;
