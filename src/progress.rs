//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::TallyConfigBuilder::progress_callback`] to receive events
//! as the extractor walks the document. The CLI renders them as a progress
//! bar; the trigger handler runs without one.
//!
//! # Example
//!
//! ```rust
//! use byline_tally::{ExtractionProgressCallback, TallyConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SkipCounter {
//!     skipped: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for SkipCounter {
//!     fn on_page_skipped(&self, page_num: usize, _total: usize, reason: String) {
//!         self.skipped.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num} skipped: {reason}");
//!     }
//! }
//!
//! let config = TallyConfig::builder()
//!     .progress_callback(Arc::new(SkipCounter { skipped: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extractor as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pages are processed one at a time, but the trait is
/// `Send + Sync` so a callback can be shared with other tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after rendering, before the first model call.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the model request is sent for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page was read; `journalists` may be zero.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, journalists: usize) {
        let _ = (page_num, total_pages, journalists);
    }

    /// Called when a page is left out of the tally.
    fn on_page_skipped(&self, page_num: usize, total_pages: usize, reason: String) {
        let _ = (page_num, total_pages, reason);
    }

    /// Called once after all pages have been attempted.
    fn on_extraction_complete(&self, total_pages: usize, journalists: usize) {
        let _ = (total_pages, journalists);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TallyConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        starts: AtomicUsize,
        completes: AtomicUsize,
        skips: AtomicUsize,
        found: AtomicUsize,
    }

    impl ExtractionProgressCallback for Tracking {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, journalists: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.found.fetch_add(journalists, Ordering::SeqCst);
        }

        fn on_page_skipped(&self, _page_num: usize, _total_pages: usize, _reason: String) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(3);
        cb.on_page_start(1, 3);
        cb.on_page_complete(1, 3, 2);
        cb.on_page_skipped(2, 3, "unparsable".into());
        cb.on_extraction_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = Tracking::default();
        t.on_page_start(1, 2);
        t.on_page_complete(1, 2, 3);
        t.on_page_start(2, 2);
        t.on_page_skipped(2, 2, "model call failed".into());

        assert_eq!(t.starts.load(Ordering::SeqCst), 2);
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.skips.load(Ordering::SeqCst), 1);
        assert_eq!(t.found.load(Ordering::SeqCst), 3);
    }
}
