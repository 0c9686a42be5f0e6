//! Orchestration: the externally visible operations of the pipeline.
//!
//! [`DocumentService`] owns the four collaborators behind trait objects —
//! document store, response cache, rasterizer, inference client — and
//! wires them into the upload → paging → prompt → inference → cache data
//! flow. Every operation is request-scoped and stateless between
//! invocations; the filesystem-backed stores are the only shared state,
//! and each write lands in a freshly minted location, so concurrent
//! requests never collide.

use crate::config::ServiceConfig;
use crate::error::DoctriageError;
use crate::inference::{InferenceService, LlmInferenceClient};
use crate::prompt::{build_prompt, InstructionMode};
use crate::raster::{PdfiumRasterizer, RasterSettings, Rasterizer};
use crate::store::{CacheStore, DocumentStore, FsCacheStore, FsDocumentStore};
use crate::types::{
    AnalyzeOutput, Asset, CacheId, CacheOutcome, DocumentId, DocumentRecord, DocumentSummary,
    ExtensionClass, UploadReceipt, content_type_for,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Cache directive attached to every served asset.
const ASSET_CACHE_CONTROL: &str = "public, max-age=3600";

/// The ingestion → analyze pipeline behind one handle.
pub struct DocumentService {
    documents: Arc<dyn DocumentStore>,
    cache: Arc<dyn CacheStore>,
    rasterizer: Arc<dyn Rasterizer>,
    inference: Arc<dyn InferenceService>,
}

impl DocumentService {
    /// Assemble a service from explicit collaborators. Tests use this with
    /// stub rasterizer/inference implementations.
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        cache: Arc<dyn CacheStore>,
        rasterizer: Arc<dyn Rasterizer>,
        inference: Arc<dyn InferenceService>,
    ) -> Self {
        Self {
            documents,
            cache,
            rasterizer,
            inference,
        }
    }

    /// Open the filesystem-backed service described by `config`:
    /// `FsDocumentStore` + `FsCacheStore` under the data dir, pdfium
    /// rasterization, and an inference client that resolves its provider
    /// from the config/environment on first use.
    pub async fn open(config: &ServiceConfig) -> Result<Self, DoctriageError> {
        let documents = FsDocumentStore::open(config.uploads_dir()).await?;
        let cache = FsCacheStore::open(config.cache_dir()).await?;
        let inference = LlmInferenceClient::from_config(config);
        Ok(Self::new(
            Arc::new(documents),
            Arc::new(cache),
            Arc::new(PdfiumRasterizer::new(RasterSettings::from(config))),
            Arc::new(inference),
        ))
    }

    // ── Upload ───────────────────────────────────────────────────────────

    /// Validate, persist, and page an uploaded document.
    ///
    /// Validation happens before any side effect. After the original and
    /// its metadata are persisted, a multi-page format goes through the
    /// rasterizer synchronously; a rasterization failure is surfaced
    /// as-is and nothing already written is rolled back.
    pub async fn upload(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadReceipt, DoctriageError> {
        if bytes.is_empty() {
            return Err(DoctriageError::EmptyUpload {
                filename: filename.to_string(),
            });
        }
        let extension = ExtensionClass::from_filename(filename)?;

        let record = DocumentRecord {
            original_name: filename.to_string(),
            extension,
            size_bytes: bytes.len() as u64,
            uploaded_at: Utc::now(),
        };
        let document_id = self.documents.create(&record, bytes).await?;

        let page_count = if extension.is_multipage() {
            let dir = self.documents.document_dir(document_id);
            let source = dir.join(format!("original.{extension}"));
            let pages = self.rasterizer.rasterize(&source, &dir).await?;
            pages.len()
        } else {
            // The original image itself stands in as page 1.
            1
        };

        info!(
            "Uploaded {} as {} ({} page(s))",
            filename, document_id, page_count
        );

        Ok(UploadReceipt {
            document_id,
            original_name: record.original_name,
            extension,
            page_count,
            message: "File uploaded and processed successfully".to_string(),
        })
    }

    /// Every stored document, for the listing surface.
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>, DoctriageError> {
        self.documents.list().await
    }

    // ── Analyze ──────────────────────────────────────────────────────────

    /// Run one inference call against the selected page and cache the raw
    /// result.
    ///
    /// The cache write is best-effort: on failure the call still succeeds
    /// with the live completion and reports [`CacheOutcome::Failed`].
    /// Concurrent calls against the same document are fully independent —
    /// each mints its own cache identity.
    pub async fn analyze(
        &self,
        document_id: DocumentId,
        page_selector: Option<usize>,
        mode: &InstructionMode,
    ) -> Result<AnalyzeOutput, DoctriageError> {
        if self.documents.resolve_status(document_id).await?.is_none() {
            return Err(DoctriageError::DocumentNotFound {
                id: document_id.to_string(),
            });
        }

        let prompt = build_prompt(self.documents.as_ref(), document_id, page_selector, mode).await?;
        info!(
            "Analyzing {} page {}/{}",
            document_id, prompt.selected_page, prompt.page_count
        );

        let reply = self.inference.infer(&prompt).await?;

        let cache = match self.cache.write(&reply.to_payload()).await {
            Ok(cache_id) => CacheOutcome::Written { cache_id },
            Err(e) => {
                // Cache persistence is not transactional with inference.
                warn!("Cache write failed for {}: {}", document_id, e);
                CacheOutcome::Failed {
                    detail: e.to_string(),
                }
            }
        };

        Ok(AnalyzeOutput {
            completion: reply.completion,
            cache,
            document_id,
        })
    }

    // ── Cache ────────────────────────────────────────────────────────────

    /// All known cache identities, in no particular order.
    pub async fn cache_entries(&self) -> Result<Vec<CacheId>, DoctriageError> {
        self.cache.list().await
    }

    /// One persisted inference result.
    pub async fn cache_entry(&self, id: CacheId) -> Result<serde_json::Value, DoctriageError> {
        self.cache
            .read(id)
            .await?
            .ok_or_else(|| DoctriageError::CacheEntryNotFound { id: id.to_string() })
    }

    // ── Assets ───────────────────────────────────────────────────────────

    /// Raw bytes of a stored page or original image, with content type
    /// and a public, time-bounded cache directive.
    pub async fn asset(
        &self,
        document_id: DocumentId,
        filename: &str,
    ) -> Result<Asset, DoctriageError> {
        let bytes = self
            .documents
            .read_asset(document_id, filename)
            .await?
            .ok_or_else(|| DoctriageError::AssetNotFound {
                id: document_id.to_string(),
                filename: filename.to_string(),
            })?;

        Ok(Asset {
            bytes,
            content_type: content_type_for(filename),
            cache_control: ASSET_CACHE_CONTROL,
        })
    }
}
