//! Storage interface: document records, page records, cache records.
//!
//! The filesystem is the only backing store shipped here, but everything
//! above this module talks to the [`DocumentStore`] / [`CacheStore`]
//! traits, so a transactional backend can be swapped in without touching
//! the pipeline.
//!
//! Identity checks are explicit lookups returning present/absent values:
//! an unknown identity resolves to an empty page list or `None`, never to
//! an error and never to an implicit "directory exists" probe leaking out.
//!
//! ## Persisted layout
//!
//! ```text
//! <root>/uploads/<documentId>/
//!     original.<ext>      the uploaded bytes, verbatim
//!     metadata.json       DocumentRecord
//!     page.1.jpeg …       converted pages, 1-based, source order
//! <root>/cache/<cacheId>.json
//! ```

mod fs;

pub use fs::{FsCacheStore, FsDocumentStore};

use crate::error::DoctriageError;
use crate::types::{CacheId, DocumentId, DocumentRecord, DocumentStatus, DocumentSummary};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

/// Converted page filenames: `page.<1-based index>.jpeg`.
static PAGE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^page\.(\d+)\.jpeg$").expect("valid page-file regex"));

/// Deterministic filename for the page at the given 1-based index.
pub fn page_filename(index: usize) -> String {
    format!("page.{index}.jpeg")
}

/// Parse a converted-page filename back to its 1-based index.
pub fn page_index(filename: &str) -> Option<usize> {
    PAGE_FILE
        .captures(filename)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Read view + write path over per-document storage locations.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a new document: fresh identity, isolated directory, the
    /// original bytes, and the metadata record. Returns the new identity.
    async fn create(
        &self,
        record: &DocumentRecord,
        original: &[u8],
    ) -> Result<DocumentId, DoctriageError>;

    /// Ordered page image paths for a document.
    ///
    /// Converted pages in numeric page order; if none exist, the original
    /// image file stands in as the single page. Unknown identities resolve
    /// to an empty list, never an error.
    async fn resolve_pages(&self, id: DocumentId) -> Result<Vec<PathBuf>, DoctriageError>;

    /// What exists for this identity, or `None` if it is unknown.
    async fn resolve_status(&self, id: DocumentId) -> Result<Option<DocumentStatus>, DoctriageError>;

    /// The persisted metadata record, or `None` when unknown/unreadable.
    async fn record(&self, id: DocumentId) -> Result<Option<DocumentRecord>, DoctriageError>;

    /// Every stored document, for the listing surface.
    async fn list(&self) -> Result<Vec<DocumentSummary>, DoctriageError>;

    /// The storage location pages are written into for this identity.
    fn document_dir(&self, id: DocumentId) -> PathBuf;

    /// Raw bytes of a named file inside the document's storage location.
    /// `None` when the document or the file does not exist.
    async fn read_asset(
        &self,
        id: DocumentId,
        filename: &str,
    ) -> Result<Option<Vec<u8>>, DoctriageError>;
}

/// Write-once persistence of raw inference output.
///
/// Unbounded by design: no eviction, no TTL, no size cap. Every write
/// mints a fresh identity, so entries are never overwritten and readers
/// never observe a half-written entry under a previously seen identity.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Persist `content` verbatim under a freshly generated identity.
    async fn write(&self, content: &serde_json::Value) -> Result<CacheId, DoctriageError>;

    /// Point lookup. `None` for an unknown identity.
    async fn read(&self, id: CacheId) -> Result<Option<serde_json::Value>, DoctriageError>;

    /// All known identities, in no particular order.
    async fn list(&self) -> Result<Vec<CacheId>, DoctriageError>;
}
