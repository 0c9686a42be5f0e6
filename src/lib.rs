//! # doctriage
//!
//! Ingest user-submitted documents, rasterize them into ordered page
//! images, classify a selected page with a vision-capable model, and
//! cache the raw result for later retrieval.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate  extension allow-list {pdf, jpg, jpeg, png}
//!  ├─ 2. Persist   original bytes + metadata record, fresh document id
//!  └─ 3. Raster    PDF → page.N.jpeg via pdfium (bulk, first-page fallback)
//!
//! analyze(documentId, page?)
//!  │
//!  ├─ 4. Resolve   page set from disk (original image stands in if no pages)
//!  ├─ 5. Prompt    base64 page image + fixed-taxonomy instruction
//!  ├─ 6. Infer     one synchronous VLM call, no retry
//!  └─ 7. Cache     raw payload under a fresh cache id (best-effort)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doctriage::{DocumentService, InstructionMode, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ServiceConfig::builder().data_dir("./data").build()?;
//!     let service = DocumentService::open(&config).await?;
//!
//!     let bytes = std::fs::read("statement.pdf")?;
//!     let receipt = service.upload("statement.pdf", &bytes).await?;
//!     println!("{} pages", receipt.page_count);
//!
//!     let output = service
//!         .analyze(receipt.document_id, Some(1), &InstructionMode::Classify)
//!         .await?;
//!     println!("{}", output.completion);
//!     Ok(())
//! }
//! ```
//!
//! ## Storage
//!
//! Everything lives under one data directory: a per-document location
//! holding the original file, a metadata record, and sequentially indexed
//! page images; and a cache directory holding one JSON record per
//! inference call. Retention is unbounded by design — pruning is an
//! operational concern outside this crate.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doctriage` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod inference;
pub mod prompt;
pub mod raster;
pub mod service;
pub mod store;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::DoctriageError;
pub use inference::{InferenceReply, InferenceService, LlmInferenceClient};
pub use prompt::{BuiltPrompt, EncodedImage, InstructionMode};
pub use raster::{PdfiumRasterizer, RasterSettings, Rasterizer};
pub use service::DocumentService;
pub use store::{CacheStore, DocumentStore, FsCacheStore, FsDocumentStore};
pub use types::{
    AnalyzeOutput, Asset, CacheId, CacheOutcome, DocumentId, DocumentRecord, DocumentStatus,
    DocumentSummary, ExtensionClass, UploadReceipt,
};
