//! Filesystem-backed stores.
//!
//! No locking and no index: disk state *is* the state, recomputed by
//! listing on every read. That keeps concurrent requests trivially safe —
//! each upload and each cache write targets a freshly minted directory or
//! file that no other request can name yet.

use crate::error::DoctriageError;
use crate::store::{page_index, CacheStore, DocumentStore};
use crate::types::{
    CacheId, DocumentId, DocumentRecord, DocumentStatus, DocumentSummary,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::fs;
use tracing::{debug, warn};

/// One directory per document under `root`, created at construction time.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Open (and create if needed) a document store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, DoctriageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| DoctriageError::storage(&root, e))?;
        Ok(Self { root })
    }

    /// Filenames in a document directory, or `None` when it doesn't exist.
    ///
    /// The single existence probe for a document identity: everything else
    /// is derived from the returned listing.
    async fn entries(&self, id: DocumentId) -> Result<Option<Vec<String>>, DoctriageError> {
        let dir = self.document_dir(id);
        let mut rd = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DoctriageError::storage(&dir, e)),
        };
        let mut names = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| DoctriageError::storage(&dir, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(Some(names))
    }

    async fn read_record(&self, id: DocumentId) -> Option<DocumentRecord> {
        let path = self.document_dir(id).join("metadata.json");
        let bytes = fs::read(&path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Unreadable metadata for {}: {}", id, e);
                None
            }
        }
    }
}

/// Converted page filenames from a directory listing, in numeric page order.
fn sorted_pages(entries: &[String]) -> Vec<(usize, &String)> {
    let mut pages: Vec<(usize, &String)> = entries
        .iter()
        .filter_map(|name| page_index(name).map(|idx| (idx, name)))
        .collect();
    pages.sort_unstable_by_key(|(idx, _)| *idx);
    pages
}

/// The original image file standing in as page 1, when present.
///
/// Only image originals qualify: a PDF original is never itself a page.
fn original_image(entries: &[String]) -> Option<&String> {
    entries.iter().find(|name| {
        name.starts_with("original.")
            && matches!(
                name.rsplit_once('.').map(|(_, e)| e),
                Some("jpg") | Some("jpeg") | Some("png")
            )
    })
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn create(
        &self,
        record: &DocumentRecord,
        original: &[u8],
    ) -> Result<DocumentId, DoctriageError> {
        let id = DocumentId::generate();
        let dir = self.document_dir(id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| DoctriageError::storage(&dir, e))?;

        let original_path = dir.join(format!("original.{}", record.extension));
        fs::write(&original_path, original)
            .await
            .map_err(|e| DoctriageError::storage(&original_path, e))?;

        let metadata_path = dir.join("metadata.json");
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| DoctriageError::Internal(format!("metadata serialization: {e}")))?;
        fs::write(&metadata_path, json)
            .await
            .map_err(|e| DoctriageError::storage(&metadata_path, e))?;

        debug!("Created document {} at {}", id, dir.display());
        Ok(id)
    }

    async fn resolve_pages(&self, id: DocumentId) -> Result<Vec<PathBuf>, DoctriageError> {
        let Some(entries) = self.entries(id).await? else {
            return Ok(Vec::new());
        };
        let dir = self.document_dir(id);

        let pages = sorted_pages(&entries);
        if !pages.is_empty() {
            return Ok(pages.into_iter().map(|(_, name)| dir.join(name)).collect());
        }

        // No converted pages: the original image file is the sole page.
        Ok(original_image(&entries)
            .map(|name| vec![dir.join(name)])
            .unwrap_or_default())
    }

    async fn resolve_status(
        &self,
        id: DocumentId,
    ) -> Result<Option<DocumentStatus>, DoctriageError> {
        let Some(entries) = self.entries(id).await? else {
            return Ok(None);
        };

        let original = entries.iter().find(|name| name.starts_with("original."));
        Ok(Some(DocumentStatus {
            has_original: original.is_some(),
            original_type: original
                .and_then(|name| name.rsplit_once('.'))
                .map(|(_, ext)| ext.to_string()),
            page_count: sorted_pages(&entries).len(),
        }))
    }

    async fn record(&self, id: DocumentId) -> Result<Option<DocumentRecord>, DoctriageError> {
        if self.entries(id).await?.is_none() {
            return Ok(None);
        }
        Ok(self.read_record(id).await)
    }

    async fn list(&self) -> Result<Vec<DocumentSummary>, DoctriageError> {
        let mut rd = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DoctriageError::storage(&self.root, e)),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| DoctriageError::storage(&self.root, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Stray files under the root (editor droppings etc.) are not documents.
            let Ok(id) = DocumentId::from_str(&name) else {
                continue;
            };
            let Some(entries) = self.entries(id).await? else {
                continue;
            };

            let display_name = match self.read_record(id).await {
                Some(record) => record.original_name,
                None => entries
                    .iter()
                    .find(|n| n.starts_with("original."))
                    .cloned()
                    .unwrap_or_else(|| format!("File {id}")),
            };

            let pages: Vec<String> = sorted_pages(&entries)
                .into_iter()
                .map(|(_, n)| n.clone())
                .collect();
            let total_pages = pages.len().max(1);

            summaries.push(DocumentSummary {
                document_id: id,
                original_file: display_name,
                pages,
                total_pages,
            });
        }
        Ok(summaries)
    }

    fn document_dir(&self, id: DocumentId) -> PathBuf {
        self.root.join(id.to_string())
    }

    async fn read_asset(
        &self,
        id: DocumentId,
        filename: &str,
    ) -> Result<Option<Vec<u8>>, DoctriageError> {
        // The asset name must be a plain filename inside the document
        // directory; anything path-like cannot name a stored asset.
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename == "."
            || filename == ".."
        {
            return Ok(None);
        }

        let path = self.document_dir(id).join(filename);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DoctriageError::storage(&path, e)),
        }
    }
}

/// One pretty-printed JSON file per cache entry under `root`.
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    /// Open (and create if needed) a cache store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, DoctriageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| DoctriageError::storage(&root, e))?;
        Ok(Self { root })
    }

    fn entry_path(&self, id: CacheId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn write(&self, content: &serde_json::Value) -> Result<CacheId, DoctriageError> {
        let id = CacheId::generate();
        let path = self.entry_path(id);
        let json = serde_json::to_vec_pretty(content)
            .map_err(|e| DoctriageError::Internal(format!("cache serialization: {e}")))?;
        fs::write(&path, json)
            .await
            .map_err(|e| DoctriageError::storage(&path, e))?;
        debug!("Cached inference result as {}", id);
        Ok(id)
    }

    async fn read(&self, id: CacheId) -> Result<Option<serde_json::Value>, DoctriageError> {
        let path = self.entry_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DoctriageError::storage(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| DoctriageError::Internal(format!("corrupt cache entry {id}: {e}")))
    }

    async fn list(&self) -> Result<Vec<CacheId>, DoctriageError> {
        let mut rd = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DoctriageError::storage(&self.root, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| DoctriageError::storage(&self.root, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_suffix(".json") {
                if let Ok(id) = CacheId::from_str(stem) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }
}
