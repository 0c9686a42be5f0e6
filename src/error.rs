//! Error types for the doctriage library.
//!
//! One enum covers the whole pipeline, but the variants fall into four
//! externally meaningful classes:
//!
//! * **Validation** — the request was malformed (bad extension, empty
//!   payload). Raised before any side effect.
//! * **Not found** — an identity the caller supplied does not resolve to
//!   anything on disk. No side effect.
//! * **External service** — rasterization or inference failed. These can
//!   surface *after* partial side effects (the original file and metadata
//!   stay on disk; nothing is rolled back).
//! * **Server fault** — configuration or I/O problems inside the service.
//!
//! Callers mapping errors onto a transport use [`DoctriageError::is_client_fault`]
//! and [`DoctriageError::is_not_found`] rather than matching variants.
//!
//! A failed cache write is deliberately *not* represented here: it never
//! fails the enclosing analyze call. See [`crate::types::CacheOutcome`].

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the doctriage library.
#[derive(Debug, Error)]
pub enum DoctriageError {
    // ── Validation ────────────────────────────────────────────────────────
    /// The uploaded filename's extension is outside the allow-list.
    #[error("Unsupported file type '{extension}'. Upload a PDF, JPG, JPEG, or PNG file.")]
    UnsupportedExtension { extension: String },

    /// The upload carried no bytes.
    #[error("No file content in upload '{filename}'")]
    EmptyUpload { filename: String },

    // ── Not found ─────────────────────────────────────────────────────────
    /// No document exists under the given identity.
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    /// No cache entry exists under the given identity.
    #[error("Cache entry not found: {id}")]
    CacheEntryNotFound { id: String },

    /// No asset with that filename under the document's storage location.
    #[error("Asset '{filename}' not found for document {id}")]
    AssetNotFound { id: String, filename: String },

    /// The document resolved to zero pages, so there is nothing to send to
    /// the inference service. Distinguished from [`Self::DocumentNotFound`]
    /// so callers can tell "never existed" from "exists but unusable".
    #[error("Document {id} has no page images to analyze")]
    NoPages { id: String },

    // ── External services ─────────────────────────────────────────────────
    /// Both the bulk and the single-page fallback rasterization passes
    /// failed. The original file and metadata are already persisted.
    #[error("Failed to rasterize '{path}': {detail}")]
    RasterizationFailed { path: PathBuf, detail: String },

    /// The inference service call failed. Never retried here.
    #[error("Inference call failed: {message}")]
    InferenceFailed { message: String },

    /// No inference provider could be constructed (missing API key etc.).
    #[error("Inference provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Server faults ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem access under the store root failed.
    #[error("Storage I/O failed at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DoctriageError {
    /// True for errors the caller caused (HTTP 400 class).
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            DoctriageError::UnsupportedExtension { .. } | DoctriageError::EmptyUpload { .. }
        )
    }

    /// True for errors where a supplied identity resolved to nothing
    /// (HTTP 404 class).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DoctriageError::DocumentNotFound { .. }
                | DoctriageError::CacheEntryNotFound { .. }
                | DoctriageError::AssetNotFound { .. }
                | DoctriageError::NoPages { .. }
        )
    }

    /// Wrap an I/O error with the path it occurred at.
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DoctriageError::Storage {
            path: path.into(),
            source,
        }
    }
}
