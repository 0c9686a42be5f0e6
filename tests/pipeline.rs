//! Integration tests for the upload → paging → prompt → inference → cache
//! pipeline.
//!
//! The pdfium rasterizer and the live model are replaced by recording
//! stubs behind the crate's `Rasterizer` / `InferenceService` seams, so
//! the suite runs hermetically against temp-dir stores while exercising
//! the real storage, prompt, and orchestration code.

use async_trait::async_trait;
use doctriage::{
    CacheOutcome, CacheStore, DoctriageError, DocumentId, DocumentService, DocumentStore,
    FsCacheStore, FsDocumentStore, InferenceReply, InferenceService, InstructionMode, Rasterizer,
};
use doctriage::prompt::BuiltPrompt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Stubs ────────────────────────────────────────────────────────────────

/// Minimal JPEG-looking bytes: SOI … EOI. Nothing decodes them; the
/// pipeline only moves them around.
const FAKE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x42, 0x42, 0x42, 0xFF, 0xD9];

/// What the stub rasterizer should pretend happened.
#[derive(Clone, Copy)]
enum RasterBehavior {
    /// Bulk pass succeeds, producing this many pages.
    Bulk(usize),
    /// Bulk pass fails; the first-page fallback produces one page.
    Fallback,
    /// Both passes fail.
    Fail,
}

struct StubRasterizer {
    behavior: RasterBehavior,
    calls: AtomicUsize,
}

impl StubRasterizer {
    fn new(behavior: RasterBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Rasterizer for StubRasterizer {
    async fn rasterize(
        &self,
        source: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, DoctriageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pages = match self.behavior {
            RasterBehavior::Bulk(n) => n,
            RasterBehavior::Fallback => 1,
            RasterBehavior::Fail => {
                return Err(DoctriageError::RasterizationFailed {
                    path: source.to_path_buf(),
                    detail: "stub failure".into(),
                })
            }
        };
        let mut paths = Vec::new();
        for i in 1..=pages {
            let path = out_dir.join(format!("page.{i}.jpeg"));
            tokio::fs::write(&path, FAKE_JPEG).await.unwrap();
            paths.push(path);
        }
        Ok(paths)
    }
}

struct StubInference {
    completion: String,
    fail: bool,
    /// Every prompt this stub has been asked to run.
    prompts: Mutex<Vec<BuiltPrompt>>,
}

impl StubInference {
    fn new(completion: &str) -> Arc<Self> {
        Arc::new(Self {
            completion: completion.to_string(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            completion: String::new(),
            fail: true,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> BuiltPrompt {
        self.prompts.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl InferenceService for StubInference {
    async fn infer(&self, prompt: &BuiltPrompt) -> Result<InferenceReply, DoctriageError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if self.fail {
            return Err(DoctriageError::InferenceFailed {
                message: "stub outage".into(),
            });
        }
        Ok(InferenceReply {
            completion: self.completion.clone(),
            input_tokens: 100,
            output_tokens: 20,
        })
    }
}

/// Cache store whose writes always fail; reads see nothing.
struct BrokenCache;

#[async_trait]
impl CacheStore for BrokenCache {
    async fn write(&self, _content: &serde_json::Value) -> Result<doctriage::CacheId, DoctriageError> {
        Err(DoctriageError::Internal("disk full".into()))
    }

    async fn read(
        &self,
        _id: doctriage::CacheId,
    ) -> Result<Option<serde_json::Value>, DoctriageError> {
        Ok(None)
    }

    async fn list(&self) -> Result<Vec<doctriage::CacheId>, DoctriageError> {
        Ok(Vec::new())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    service: DocumentService,
    documents: Arc<FsDocumentStore>,
    cache: Arc<FsCacheStore>,
    _tmp: TempDir,
}

async fn harness(
    rasterizer: Arc<dyn Rasterizer>,
    inference: Arc<dyn InferenceService>,
) -> Harness {
    let tmp = TempDir::new().unwrap();
    let documents = Arc::new(
        FsDocumentStore::open(tmp.path().join("uploads"))
            .await
            .unwrap(),
    );
    let cache = Arc::new(FsCacheStore::open(tmp.path().join("cache")).await.unwrap());
    let service = DocumentService::new(
        documents.clone(),
        cache.clone(),
        rasterizer,
        inference,
    );
    Harness {
        service,
        documents,
        cache,
        _tmp: tmp,
    }
}

async fn classify(
    h: &Harness,
    id: DocumentId,
    page: Option<usize>,
) -> Result<doctriage::AnalyzeOutput, DoctriageError> {
    h.service.analyze(id, page, &InstructionMode::Classify).await
}

// ── Upload ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_succeeds_for_every_allowed_extension() {
    let h = harness(
        StubRasterizer::new(RasterBehavior::Bulk(2)),
        StubInference::new("ok"),
    )
    .await;

    for filename in ["doc.pdf", "photo.jpg", "photo.jpeg", "shot.png"] {
        let receipt = h.service.upload(filename, FAKE_JPEG).await.unwrap();
        assert!(receipt.page_count >= 1, "{filename}");

        let pages = h.documents.resolve_pages(receipt.document_id).await.unwrap();
        assert!(!pages.is_empty(), "{filename} must resolve to pages");
    }
}

#[tokio::test]
async fn rejected_upload_leaves_no_storage_behind() {
    let h = harness(
        StubRasterizer::new(RasterBehavior::Bulk(1)),
        StubInference::new("ok"),
    )
    .await;

    let err = h.service.upload("doc.gif", FAKE_JPEG).await.unwrap_err();
    assert!(err.is_client_fault());

    let err = h.service.upload("doc.pdf", b"").await.unwrap_err();
    assert!(err.is_client_fault());

    assert!(h.service.list_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn image_upload_does_not_invoke_the_rasterizer() {
    let raster = StubRasterizer::new(RasterBehavior::Bulk(3));
    let h = harness(raster.clone(), StubInference::new("ok")).await;

    let receipt = h.service.upload("photo.png", FAKE_JPEG).await.unwrap();
    assert_eq!(receipt.page_count, 1);
    assert_eq!(raster.calls.load(Ordering::SeqCst), 0);

    // The original image itself stands in as page 1.
    let pages = h.documents.resolve_pages(receipt.document_id).await.unwrap();
    assert_eq!(pages.len(), 1);
    assert!(pages[0].ends_with("original.png"));
}

#[tokio::test]
async fn bulk_and_fallback_paths_agree_for_single_page_sources() {
    let bulk = harness(
        StubRasterizer::new(RasterBehavior::Bulk(1)),
        StubInference::new("ok"),
    )
    .await;
    let fallback = harness(
        StubRasterizer::new(RasterBehavior::Fallback),
        StubInference::new("ok"),
    )
    .await;

    let a = bulk.service.upload("doc.pdf", FAKE_JPEG).await.unwrap();
    let b = fallback.service.upload("doc.pdf", FAKE_JPEG).await.unwrap();
    assert_eq!(a.page_count, 1);
    assert_eq!(b.page_count, 1);

    let pages_a = bulk.documents.resolve_pages(a.document_id).await.unwrap();
    let pages_b = fallback
        .documents
        .resolve_pages(b.document_id)
        .await
        .unwrap();
    assert_eq!(pages_a.len(), pages_b.len());
}

#[tokio::test]
async fn rasterization_failure_keeps_original_and_metadata() {
    let h = harness(
        StubRasterizer::new(RasterBehavior::Fail),
        StubInference::new("ok"),
    )
    .await;

    let err = h.service.upload("doc.pdf", FAKE_JPEG).await.unwrap_err();
    assert!(matches!(err, DoctriageError::RasterizationFailed { .. }));

    // Best-effort persistence: the partial state is left in place.
    let listing = h.service.list_documents().await.unwrap();
    assert_eq!(listing.len(), 1);
    let id = listing[0].document_id;
    let status = h.documents.resolve_status(id).await.unwrap().unwrap();
    assert!(status.has_original);
    assert_eq!(status.page_count, 0);
    assert!(h.documents.record(id).await.unwrap().is_some());
}

// ── Analyze ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_unknown_document_is_not_found() {
    let h = harness(
        StubRasterizer::new(RasterBehavior::Bulk(1)),
        StubInference::new("ok"),
    )
    .await;

    let err = classify(&h, DocumentId::generate(), None).await.unwrap_err();
    assert!(matches!(err, DoctriageError::DocumentNotFound { .. }));
}

#[tokio::test]
async fn analyze_document_without_pages_is_a_distinguished_error() {
    // A PDF whose conversion produced nothing: the document exists but
    // resolves to zero pages.
    let h = harness(
        StubRasterizer::new(RasterBehavior::Bulk(0)),
        StubInference::new("ok"),
    )
    .await;
    let receipt = h.service.upload("doc.pdf", FAKE_JPEG).await.unwrap();

    let err = classify(&h, receipt.document_id, None).await.unwrap_err();
    assert!(matches!(err, DoctriageError::NoPages { .. }));
}

#[tokio::test]
async fn out_of_range_page_selector_behaves_like_omitted() {
    let inference = StubInference::new("ok");
    let h = harness(StubRasterizer::new(RasterBehavior::Bulk(3)), inference.clone()).await;
    let receipt = h.service.upload("doc.pdf", FAKE_JPEG).await.unwrap();

    classify(&h, receipt.document_id, None).await.unwrap();
    let omitted = inference.last_prompt();
    assert_eq!(omitted.selected_page, 1);
    assert_eq!(omitted.page_count, 3);

    classify(&h, receipt.document_id, Some(7)).await.unwrap();
    let out_of_range = inference.last_prompt();
    assert_eq!(out_of_range.selected_page, 1);
    assert_eq!(out_of_range.image.data, omitted.image.data);

    classify(&h, receipt.document_id, Some(2)).await.unwrap();
    assert_eq!(inference.last_prompt().selected_page, 2);
}

#[tokio::test]
async fn analyze_prompt_carries_resolved_paging_metadata() {
    let inference = StubInference::new("ok");
    let h = harness(StubRasterizer::new(RasterBehavior::Bulk(2)), inference.clone()).await;
    let receipt = h.service.upload("doc.pdf", FAKE_JPEG).await.unwrap();

    classify(&h, receipt.document_id, None).await.unwrap();
    let prompt = inference.last_prompt();
    assert!(prompt.instruction.contains("\"hasMultiplePages\": true"));
    assert!(prompt.instruction.contains("\"pageCount\": 2"));
    assert_eq!(prompt.image.mime_type, "image/jpeg");
}

#[tokio::test]
async fn inference_failure_surfaces_and_caches_nothing() {
    let h = harness(
        StubRasterizer::new(RasterBehavior::Bulk(1)),
        StubInference::failing(),
    )
    .await;
    let receipt = h.service.upload("doc.pdf", FAKE_JPEG).await.unwrap();

    let err = classify(&h, receipt.document_id, None).await.unwrap_err();
    assert!(matches!(err, DoctriageError::InferenceFailed { .. }));
    assert!(h.cache.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn cache_write_failure_degrades_but_does_not_fail_analyze() {
    let tmp = TempDir::new().unwrap();
    let documents = Arc::new(
        FsDocumentStore::open(tmp.path().join("uploads"))
            .await
            .unwrap(),
    );
    let service = DocumentService::new(
        documents.clone(),
        Arc::new(BrokenCache),
        StubRasterizer::new(RasterBehavior::Bulk(1)),
        StubInference::new("still classified"),
    );

    let receipt = service.upload("doc.pdf", FAKE_JPEG).await.unwrap();
    let output = service
        .analyze(receipt.document_id, None, &InstructionMode::Classify)
        .await
        .unwrap();

    assert_eq!(output.completion, "still classified");
    assert!(matches!(output.cache, CacheOutcome::Failed { .. }));
    assert!(output.cache.cache_id().is_none());
}

#[tokio::test]
async fn concurrent_analyzes_mint_distinct_independently_readable_entries() {
    let h = harness(
        StubRasterizer::new(RasterBehavior::Bulk(2)),
        StubInference::new("payslip"),
    )
    .await;
    let receipt = h.service.upload("doc.pdf", FAKE_JPEG).await.unwrap();
    let id = receipt.document_id;

    let (a, b) = tokio::join!(classify(&h, id, Some(1)), classify(&h, id, Some(1)));
    let a = a.unwrap();
    let b = b.unwrap();

    let id_a = a.cache.cache_id().unwrap();
    let id_b = b.cache.cache_id().unwrap();
    assert_ne!(id_a, id_b);

    for cache_id in [id_a, id_b] {
        let entry = h.service.cache_entry(cache_id).await.unwrap();
        assert_eq!(entry["text"], "payslip");
    }
}

// ── Cache surface ────────────────────────────────────────────────────────

#[tokio::test]
async fn n_analyzes_produce_n_distinct_cache_identities() {
    let h = harness(
        StubRasterizer::new(RasterBehavior::Bulk(1)),
        StubInference::new("ok"),
    )
    .await;
    let receipt = h.service.upload("doc.pdf", FAKE_JPEG).await.unwrap();

    let mut minted = Vec::new();
    for _ in 0..5 {
        let output = classify(&h, receipt.document_id, None).await.unwrap();
        minted.push(output.cache.cache_id().unwrap());
    }

    let mut listed = h.service.cache_entries().await.unwrap();
    assert_eq!(listed.len(), 5);
    listed.sort_by_key(|i| i.to_string());
    minted.sort_by_key(|i| i.to_string());
    assert_eq!(listed, minted);
}

#[tokio::test]
async fn unknown_cache_identity_is_not_found() {
    let h = harness(
        StubRasterizer::new(RasterBehavior::Bulk(1)),
        StubInference::new("ok"),
    )
    .await;

    let err = h
        .service
        .cache_entry(doctriage::CacheId::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, DoctriageError::CacheEntryNotFound { .. }));
}

// ── End-to-end scenario ──────────────────────────────────────────────────

#[tokio::test]
async fn two_page_upload_analyze_cache_and_asset_round_trip() {
    let inference = StubInference::new("{\"documentType\":\"tax_statement\"}");
    let h = harness(StubRasterizer::new(RasterBehavior::Bulk(2)), inference.clone()).await;

    // Upload a 2-page source.
    let receipt = h.service.upload("statement.pdf", FAKE_JPEG).await.unwrap();
    assert_eq!(receipt.page_count, 2);

    // Analyze page 2.
    let output = h
        .service
        .analyze(receipt.document_id, Some(2), &InstructionMode::Classify)
        .await
        .unwrap();
    assert_eq!(inference.last_prompt().selected_page, 2);
    assert_eq!(output.document_id, receipt.document_id);

    // The cached entry's completion matches the live response.
    let cache_id = output.cache.cache_id().unwrap();
    let entry = h.service.cache_entry(cache_id).await.unwrap();
    assert_eq!(entry["text"], output.completion);

    // The page-2 asset serves image bytes as JPEG with a cache directive.
    let asset = h
        .service
        .asset(receipt.document_id, "page.2.jpeg")
        .await
        .unwrap();
    assert_eq!(asset.bytes, FAKE_JPEG);
    assert_eq!(asset.content_type, "image/jpeg");
    assert_eq!(asset.cache_control, "public, max-age=3600");

    // Unknown asset names are not found.
    let err = h
        .service
        .asset(receipt.document_id, "page.9.jpeg")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn extraction_mode_reaches_the_model_with_the_schema() {
    let inference = StubInference::new("{\"employerName\":\"ACME\"}");
    let h = harness(StubRasterizer::new(RasterBehavior::Bulk(1)), inference.clone()).await;
    let receipt = h.service.upload("payslip.png", FAKE_JPEG).await.unwrap();

    let mode = InstructionMode::Extract {
        fields: serde_json::json!({"employerName": "string", "netPay": "number"}),
    };
    h.service
        .analyze(receipt.document_id, None, &mode)
        .await
        .unwrap();

    let prompt = inference.last_prompt();
    assert!(prompt.instruction.contains("employerName"));
    assert!(prompt.instruction.contains("extractionDateTime"));
    assert_eq!(prompt.image.mime_type, "image/png");
}
