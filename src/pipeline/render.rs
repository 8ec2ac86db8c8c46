//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is synchronous and
//! CPU-bound. `tokio::task::spawn_blocking` keeps it off the async worker
//! threads.
//!
//! ## All-or-nothing
//!
//! A document that cannot be opened, or any page that fails to render,
//! aborts the whole upload. There is no partial-page recovery.

use crate::error::TallyError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns a PDF on disk into one image per page, in page order.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render all pages. Returns `(page_index_0based, image)` tuples.
    async fn render_all(&self, pdf_path: &Path) -> Result<Vec<(usize, DynamicImage)>, TallyError>;
}

/// [`PageRenderer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    max_pixels: u32,
    password: Option<String>,
}

impl PdfiumRenderer {
    pub fn new(max_pixels: u32, password: Option<String>) -> Self {
        Self {
            max_pixels,
            password,
        }
    }

    pub fn from_config(config: &crate::config::TallyConfig) -> Self {
        Self::new(config.max_rendered_pixels, config.password.clone())
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn render_all(&self, pdf_path: &Path) -> Result<Vec<(usize, DynamicImage)>, TallyError> {
        let path = pdf_path.to_path_buf();
        let max_pixels = self.max_pixels;
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || {
            render_pages_blocking(&path, max_pixels, password.as_deref())
        })
        .await
        .map_err(|e| TallyError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Bind pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, TallyError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(p) => {
            let p = PathBuf::from(p);
            let lib = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            };
            Pdfium::bind_to_library(&lib)
                .map_err(|e| TallyError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e)))?
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| TallyError::PdfiumBindingFailed(format!("{:?}", e)))?,
    };
    Ok(Pdfium::new(bindings))
}

fn load_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> TallyError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            TallyError::WrongPassword {
                path: pdf_path.to_path_buf(),
            }
        } else {
            TallyError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        }
    } else {
        TallyError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: err_str,
        }
    }
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    pdf_path: &Path,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<(usize, DynamicImage)>, TallyError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, password, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page = pages
            .get(idx as u16)
            .map_err(|e| TallyError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            TallyError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push((idx, image));
    }

    info!("Successfully converted PDF to {} images", results.len());
    Ok(results)
}
