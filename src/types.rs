//! Identities, persisted records, and response shapes.
//!
//! Two opaque identity spaces exist and never mix: a [`DocumentId`] scopes
//! every artifact derived from one upload; a [`CacheId`] addresses one
//! persisted inference result. Both are freshly minted uuid-v4 values, so
//! concurrent operations can never collide on a storage location.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DoctriageError;

// ── Identities ───────────────────────────────────────────────────────────

/// Opaque identity of one uploaded document and its derived artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Mint a fresh identity. Never reused, so two concurrent uploads
    /// always land in disjoint storage locations.
    pub fn generate() -> Self {
        DocumentId(Uuid::new_v4())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = DoctriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(DocumentId)
            .map_err(|_| DoctriageError::DocumentNotFound { id: s.to_string() })
    }
}

/// Opaque identity of one persisted inference result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheId(Uuid);

impl CacheId {
    pub fn generate() -> Self {
        CacheId(Uuid::new_v4())
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CacheId {
    type Err = DoctriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(CacheId)
            .map_err(|_| DoctriageError::CacheEntryNotFound { id: s.to_string() })
    }
}

// ── Extension allow-list ─────────────────────────────────────────────────

/// The fixed set of accepted upload formats.
///
/// `Jpg` and `Jpeg` are kept distinct (rather than normalised) because the
/// persisted original keeps the caller's extension: `original.jpg` and
/// `original.jpeg` are different filenames on disk and in asset URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionClass {
    Pdf,
    Jpg,
    Jpeg,
    Png,
}

impl ExtensionClass {
    /// Parse the extension of a declared filename, case-insensitively.
    ///
    /// Anything outside the allow-list fails with a validation error,
    /// before any side effect has occurred.
    pub fn from_filename(filename: &str) -> Result<Self, DoctriageError> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(ExtensionClass::Pdf),
            "jpg" => Ok(ExtensionClass::Jpg),
            "jpeg" => Ok(ExtensionClass::Jpeg),
            "png" => Ok(ExtensionClass::Png),
            _ => Err(DoctriageError::UnsupportedExtension { extension: ext }),
        }
    }

    /// The extension string used on disk, without the leading dot.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionClass::Pdf => "pdf",
            ExtensionClass::Jpg => "jpg",
            ExtensionClass::Jpeg => "jpeg",
            ExtensionClass::Png => "png",
        }
    }

    /// Whether this format can carry multiple pages and therefore goes
    /// through the rasterization adapter on upload.
    pub fn is_multipage(&self) -> bool {
        matches!(self, ExtensionClass::Pdf)
    }
}

impl fmt::Display for ExtensionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content type for a stored asset, inferred from its file extension.
///
/// Everything unknown defaults to JPEG because converted pages are always
/// JPEG and they dominate asset traffic.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        _ => "image/jpeg",
    }
}

// ── Persisted records ────────────────────────────────────────────────────

/// The per-document metadata record, persisted as `metadata.json` next to
/// the original file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub original_name: String,
    pub extension: ExtensionClass,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// The `resolveMetadata` view: what exists for a known document identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentStatus {
    /// Whether the original upload is still present.
    pub has_original: bool,
    /// Extension of the original file, when present.
    pub original_type: Option<String>,
    /// Number of converted page images (0 when the original image itself
    /// stands in as page 1).
    pub page_count: usize,
}

// ── Response shapes ──────────────────────────────────────────────────────

/// Returned by a successful upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub document_id: DocumentId,
    pub original_name: String,
    pub extension: ExtensionClass,
    pub page_count: usize,
    pub message: String,
}

/// One entry in the document listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub document_id: DocumentId,
    /// Display name: the uploaded filename when metadata is readable,
    /// otherwise the on-disk original filename.
    pub original_file: String,
    /// Converted page filenames in page order.
    pub pages: Vec<String>,
    pub total_pages: usize,
}

/// Whether the best-effort cache write of an analyze result landed.
///
/// Cache persistence is not transactional with inference: a failed write
/// is logged and the analyze call still succeeds with the live completion.
/// Carrying the failure here (instead of only logging it) lets callers and
/// tests observe the degraded success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "status")]
pub enum CacheOutcome {
    /// The raw inference payload was persisted under this identity.
    Written { cache_id: CacheId },
    /// Persistence failed; only the live response exists.
    Failed { detail: String },
}

impl CacheOutcome {
    pub fn cache_id(&self) -> Option<CacheId> {
        match self {
            CacheOutcome::Written { cache_id } => Some(*cache_id),
            CacheOutcome::Failed { .. } => None,
        }
    }
}

/// Returned by a successful analyze call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOutput {
    /// The textual completion from the inference service.
    pub completion: String,
    /// Best-effort cache persistence outcome.
    #[serde(flatten)]
    pub cache: CacheOutcome,
    /// Advisory correlation back to the analyzed document. Not stored in
    /// the cache entry itself.
    #[serde(rename = "originalDocumentId")]
    pub document_id: DocumentId,
}

/// A served asset: raw bytes plus transport metadata.
#[derive(Debug, Clone)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// Public, time-bounded cache directive for the serving layer.
    pub cache_control: &'static str,
}
