//! Integration tests for the storage-finalize handler.
//!
//! Rendering and the model are replaced with in-memory fakes; blobs come from
//! a `LocalBlobStore` over a temp dir and results land in a `MemoryStore`.
//! No pdfium library, network access or API key is needed.
//!
//! Run with:
//!   cargo test --test trigger

use async_trait::async_trait;
use byline_tally::output::{ProcessingStatus, SyncStatus};
use byline_tally::{
    BlobStore, Extractor, LocalBlobStore, MemoryStore, PageError, PageRenderer, ResultStore, SheetsApi,
    SheetsConfig, SheetsError, StorageEvent, TallyConfig, TallyError, TriggerHandler,
    TriggerOutcome, VisionModel,
};
use edgequake_llm::ImageData;
use image::DynamicImage;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Produces `pages` blank images, or fails like a corrupt document.
struct FakeRenderer {
    pages: usize,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeRenderer {
    fn with_pages(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn corrupt() -> Arc<Self> {
        Arc::new(Self {
            pages: 0,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render_all(&self, pdf_path: &Path) -> Result<Vec<(usize, DynamicImage)>, TallyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TallyError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: "xref table broken".into(),
            });
        }
        Ok((0..self.pages)
            .map(|i| (i, DynamicImage::new_rgb8(8, 8)))
            .collect())
    }
}

/// Answers page `n` with `replies[n - 1]` and records call order.
struct ScriptedModel {
    replies: Vec<&'static str>,
    seen: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedModel {
    fn new(replies: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            replies,
            seen: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn read_page(&self, page_num: usize, _image: ImageData) -> Result<String, PageError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.seen.lock().unwrap().push(page_num);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.replies.get(page_num - 1) {
            Some(&"FAIL") => Err(PageError::ModelCallFailed {
                page: page_num,
                detail: "HTTP 529 overloaded".into(),
            }),
            Some(reply) => Ok(reply.to_string()),
            None => Ok("{}".to_string()),
        }
    }
}

/// Every append fails, or every append succeeds; calls are counted.
#[derive(Default)]
struct RecordingSheets {
    fail: bool,
    calls: AtomicUsize,
    rows: Mutex<Vec<Vec<Value>>>,
}

#[async_trait]
impl SheetsApi for RecordingSheets {
    async fn append(&self, _id: &str, range: &str, rows: &[Vec<Value>]) -> Result<(), SheetsError> {
        assert_eq!(range, "New Data!A2");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SheetsError::Transport("connection reset".into()));
        }
        self.rows.lock().unwrap().extend(rows.iter().cloned());
        Ok(())
    }
}

/// A database that rejects every write.
struct BrokenStore;

#[async_trait]
impl ResultStore for BrokenStore {
    async fn set(&self, path: &str, _value: &Value) -> Result<(), TallyError> {
        Err(TallyError::DatabaseWrite {
            path: path.to_string(),
            reason: "HTTP 401".into(),
        })
    }

    async fn get(&self, _path: &str) -> Result<Option<Value>, TallyError> {
        Ok(None)
    }
}

/// Serves the same PDF bytes for any object name.
struct FixedBlob;

#[async_trait]
impl BlobStore for FixedBlob {
    async fn download(&self, _bucket: &str, _name: &str, dest: &Path) -> Result<u64, TallyError> {
        let body = b"%PDF-1.7\n% fake body\n";
        tokio::fs::write(dest, body)
            .await
            .map_err(|e| TallyError::Internal(e.to_string()))?;
        Ok(body.len() as u64)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Route handler logs through the test harness; `RUST_LOG=debug` to see them.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const ALICE_P1: &str = r#"{"journalist_stats": {"Alice": {"exclusive": 1, "standard": 0}}}"#;
const ALICE_BOB_P2: &str = r#"```json
{"journalist_stats": {"Alice": {"exclusive": 0, "standard": 2}, "Bob": {"exclusive": 1, "standard": 0}}}
```"#;

/// Bucket root with `papers/2024/afr-2024-11-07.pdf` and `papers/notes.txt`.
fn bucket_root() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    let dir: PathBuf = root.path().join("papers/2024");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("afr-2024-11-07.pdf"), b"%PDF-1.7\n% fake body\n").unwrap();
    std::fs::write(dir.join("disguised.pdf"), b"<html>403 Forbidden</html>").unwrap();
    std::fs::write(root.path().join("papers/notes.txt"), b"hello").unwrap();
    root
}

fn event(name: &str) -> StorageEvent {
    StorageEvent::from_value(json!({
        "data": {
            "bucket": "papers",
            "name": name,
            "size": "20",
            "timeCreated": "2024-11-07T06:37:53.659Z",
            "contentType": "application/pdf"
        }
    }))
    .unwrap()
}

fn handler(
    root: &TempDir,
    renderer: Arc<FakeRenderer>,
    model: Arc<ScriptedModel>,
    store: Arc<dyn ResultStore>,
) -> TriggerHandler {
    init_logging();
    let extractor = Extractor::new(renderer, model, TallyConfig::default());
    TriggerHandler::new(Arc::new(LocalBlobStore::new(root.path())), store, extractor)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_pdf_object_is_skipped_without_writes() {
    let root = bucket_root();
    let renderer = FakeRenderer::with_pages(1);
    let store = Arc::new(MemoryStore::new());
    let h = handler(&root, renderer.clone(), ScriptedModel::new(vec![]), store.clone());

    let outcome = assert_ok!(h.handle(&event("notes.txt")).await);
    assert_eq!(
        outcome,
        TriggerOutcome::Skipped {
            name: "notes.txt".into()
        }
    );
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn pdf_is_tallied_and_stored_once() {
    let root = bucket_root();
    let store = Arc::new(MemoryStore::new());
    let h = handler(
        &root,
        FakeRenderer::with_pages(2),
        ScriptedModel::new(vec![ALICE_P1, ALICE_BOB_P2]),
        store.clone(),
    );

    let outcome = assert_ok!(h.handle(&event("2024/afr-2024-11-07.pdf")).await);
    let TriggerOutcome::Processed { key, result, stats } = outcome else {
        panic!("expected Processed");
    };

    let day = result.processed_at.format("%Y-%m-%d");
    assert_eq!(key, format!("processed_pdfs/{day}_afr-2024-11-07_pdf"));
    assert_eq!(result.status, ProcessingStatus::Processed);
    assert_eq!(result.file_name, "2024/afr-2024-11-07.pdf");
    assert_eq!(result.file_size, 20);
    assert_eq!(result.uploaded_at.to_rfc3339(), "2024-11-07T06:37:53.659+00:00");
    assert!(result.sheets_sync.is_none());
    assert_eq!(stats.total_pages, 2);
    assert_eq!(stats.pages_with_bylines, 2);

    let alice = result.results.get("Alice").unwrap();
    assert_eq!((alice.exclusive, alice.standard), (1, 2));
    assert_eq!(alice.pages, vec![1, 2]);
    let bob = result.results.get("Bob").unwrap();
    assert_eq!((bob.exclusive, bob.standard, bob.pages.clone()), (1, 0, vec![2]));

    let stored = store.snapshot().await;
    assert_eq!(stored.len(), 1);
    let value = &stored[&key];
    assert_eq!(value["status"], "processed");
    assert_eq!(value["fileName"], "2024/afr-2024-11-07.pdf");
    assert_eq!(
        value["results"]["journalist_stats"]["Alice"],
        json!({"exclusive": 1, "standard": 2, "pages": [1, 2]})
    );
    assert!(value.get("sheets_sync").is_none());
}

#[tokio::test]
async fn failed_and_empty_pages_leave_totals_unchanged() {
    let root = bucket_root();
    let store = Arc::new(MemoryStore::new());
    let h = handler(
        &root,
        FakeRenderer::with_pages(4),
        ScriptedModel::new(vec![
            ALICE_P1,
            "I could not find any bylines on this page.",
            "FAIL",
            r#"{"journalist_stats": {}}"#,
        ]),
        store.clone(),
    );

    let outcome = assert_ok!(h.handle(&event("2024/afr-2024-11-07.pdf")).await);
    let TriggerOutcome::Processed { result, stats, .. } = outcome else {
        panic!("expected Processed");
    };
    assert_eq!(result.results.len(), 1);
    let alice = result.results.get("Alice").unwrap();
    assert_eq!((alice.exclusive, alice.standard), (1, 0));
    assert_eq!(alice.pages, vec![1]);
    assert_eq!(stats.failed_pages, 2);
    assert_eq!(stats.empty_pages, 1);
}

#[tokio::test]
async fn pages_are_read_one_at_a_time_in_order() {
    let root = bucket_root();
    let model = ScriptedModel::new(vec![ALICE_P1, ALICE_P1, ALICE_P1, ALICE_P1, ALICE_P1]);
    let h = handler(
        &root,
        FakeRenderer::with_pages(5),
        model.clone(),
        Arc::new(MemoryStore::new()),
    );

    assert_ok!(h.handle(&event("2024/afr-2024-11-07.pdf")).await);
    assert_eq!(*model.seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn render_failure_records_error_and_returns_it() {
    let root = bucket_root();
    let store = Arc::new(MemoryStore::new());
    let h = handler(
        &root,
        FakeRenderer::corrupt(),
        ScriptedModel::new(vec![]),
        store.clone(),
    );

    let err = assert_err!(h.handle(&event("2024/afr-2024-11-07.pdf")).await);
    assert!(matches!(err, TallyError::CorruptPdf { .. }));

    let stored = store.snapshot().await;
    assert_eq!(stored.len(), 1);
    let (key, record) = stored.iter().next().unwrap();
    assert!(key.starts_with("processing_errors/error_"), "key {key}");
    assert_eq!(record["fileName"], "2024/afr-2024-11-07.pdf");
    assert!(record["error"].as_str().unwrap().contains("xref table broken"));
    assert!(record["timestamp"].is_string());
}

#[tokio::test]
async fn non_pdf_bytes_are_rejected_before_rendering() {
    let root = bucket_root();
    let renderer = FakeRenderer::with_pages(1);
    let store = Arc::new(MemoryStore::new());
    let h = handler(&root, renderer.clone(), ScriptedModel::new(vec![]), store.clone());

    let err = assert_err!(h.handle(&event("2024/disguised.pdf")).await);
    assert!(matches!(err, TallyError::NotAPdf { .. }));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert!(store.keys().await[0].starts_with("processing_errors/"));
}

#[tokio::test]
async fn missing_blob_is_recorded() {
    let root = bucket_root();
    let store = Arc::new(MemoryStore::new());
    let h = handler(
        &root,
        FakeRenderer::with_pages(1),
        ScriptedModel::new(vec![]),
        store.clone(),
    );

    let err = assert_err!(h.handle(&event("2024/gone.pdf")).await);
    assert!(matches!(err, TallyError::BlobDownloadFailed { .. }));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn failed_error_write_keeps_original_error() {
    let root = bucket_root();
    let h = handler(
        &root,
        FakeRenderer::corrupt(),
        ScriptedModel::new(vec![]),
        Arc::new(BrokenStore),
    );

    let err = assert_err!(h.handle(&event("2024/afr-2024-11-07.pdf")).await);
    assert!(matches!(err, TallyError::CorruptPdf { .. }), "got {err:?}");
}

#[tokio::test]
async fn database_write_failure_is_an_error() {
    let root = bucket_root();
    let h = handler(
        &root,
        FakeRenderer::with_pages(1),
        ScriptedModel::new(vec![ALICE_P1]),
        Arc::new(BrokenStore),
    );

    let err = assert_err!(h.handle(&event("2024/afr-2024-11-07.pdf")).await);
    assert!(matches!(err, TallyError::DatabaseWrite { .. }));
}

#[tokio::test]
async fn sheet_rows_follow_the_stored_result() {
    let root = bucket_root();
    let sheets = Arc::new(RecordingSheets::default());
    let h = handler(
        &root,
        FakeRenderer::with_pages(2),
        ScriptedModel::new(vec![ALICE_P1, ALICE_BOB_P2]),
        Arc::new(MemoryStore::new()),
    )
    .with_sheets(sheets.clone(), SheetsConfig::new("sheet-id").with_backoff_ms(0));

    let outcome = assert_ok!(h.handle(&event("2024/afr-2024-11-07.pdf")).await);
    let TriggerOutcome::Processed { result, .. } = outcome else {
        panic!("expected Processed");
    };
    assert_eq!(result.sheets_sync.unwrap().status, SyncStatus::Success);
    assert_eq!(sheets.calls.load(Ordering::SeqCst), 1);

    let rows = sheets.rows.lock().unwrap();
    assert_eq!(rows.len(), 2);
    let day = result.processed_at.format("%Y-%m-%d").to_string();
    assert_eq!(rows[0][0], json!(day));
    assert_eq!(rows[0][2], json!("Alice"));
    assert_eq!(rows[0][3], json!("AFR"));
    assert_eq!(&rows[0][4..], &[json!(0), json!(1), json!(2), json!(0)]);
    assert_eq!(rows[1][2], json!("Bob"));
}

#[tokio::test]
async fn sheet_failure_is_reported_not_raised() {
    let root = bucket_root();
    let store = Arc::new(MemoryStore::new());
    let sheets = Arc::new(RecordingSheets {
        fail: true,
        ..Default::default()
    });
    let h = handler(
        &root,
        FakeRenderer::with_pages(1),
        ScriptedModel::new(vec![ALICE_P1]),
        store.clone(),
    )
    .with_sheets(sheets.clone(), SheetsConfig::new("sheet-id").with_backoff_ms(0));

    let outcome = assert_ok!(h.handle(&event("2024/afr-2024-11-07.pdf")).await);
    let TriggerOutcome::Processed { key, result, .. } = outcome else {
        panic!("expected Processed");
    };
    assert_eq!(result.sheets_sync.unwrap().status, SyncStatus::Failed);
    assert_eq!(sheets.calls.load(Ordering::SeqCst), 3);

    let stored = store.get(&key).await.unwrap().unwrap();
    assert!(stored.get("sheets_sync").is_none());
}

#[tokio::test]
async fn long_object_name_is_processed() {
    init_logging();
    let store = Arc::new(MemoryStore::new());
    let extractor = Extractor::new(
        FakeRenderer::with_pages(1),
        ScriptedModel::new(vec![ALICE_P1]),
        TallyConfig::default(),
    );
    let h = TriggerHandler::new(Arc::new(FixedBlob), store.clone(), extractor);
    let name = format!("uploads/{}.pdf", "a".repeat(300));

    let outcome = assert_ok!(h.handle(&event(&name)).await);
    let TriggerOutcome::Processed { key, result, .. } = outcome else {
        panic!("expected Processed");
    };
    assert!(key.ends_with(&format!("_{}_pdf", "a".repeat(300))));
    assert_eq!(result.file_name, name);
    assert_eq!(result.results.get("Alice").unwrap().exclusive, 1);
    assert_eq!(store.keys().await, vec![key]);
}
