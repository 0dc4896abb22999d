//! Document sources
//!
//! - [`DirectorySource`]: plain text and markdown files in a directory
//! - [`MemorySource`]: documents held in memory

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dkg_core::{DkgError, Document, DocumentId, DocumentSource, Result};

/// File extensions read by [`DirectorySource`]
const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

// ============================================================================
// Directory Source
// ============================================================================

/// Reads one document per file; the id is the file stem
///
/// When several files share a stem (`a.txt`, `a.md`) the first extension in
/// `txt`, `md`, `markdown` order is read and the others are reported.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Position of the extension in [`SUPPORTED_EXTENSIONS`]
    fn extension_rank(path: &Path) -> Option<usize> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        SUPPORTED_EXTENSIONS.iter().position(|supported| *supported == ext)
    }

    async fn locate(&self, id: &DocumentId) -> Option<PathBuf> {
        for ext in SUPPORTED_EXTENSIONS {
            let candidate = self.root.join(format!("{}.{ext}", id.as_str()));
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl DocumentSource for DirectorySource {
    async fn list_documents(&self) -> Result<Vec<DocumentId>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut files: BTreeMap<String, Vec<(usize, PathBuf)>> = BTreeMap::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(rank) = Self::extension_rank(&path) else {
                continue;
            };
            if !is_file(&path).await {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.entry(stem.to_string()).or_default().push((rank, path));
            }
        }

        for (stem, paths) in files.iter_mut().filter(|(_, paths)| paths.len() > 1) {
            paths.sort();
            let ignored: Vec<String> = paths[1..]
                .iter()
                .map(|(_, path)| path.display().to_string())
                .collect();
            tracing::warn!(
                document = %stem,
                read = %paths[0].1.display(),
                ignored = ?ignored,
                "Several files share one document id"
            );
        }

        let ids: Vec<DocumentId> = files.into_keys().map(DocumentId::new).collect();
        tracing::debug!(root = %self.root.display(), count = ids.len(), "Listed documents");
        Ok(ids)
    }

    async fn fetch(&self, id: &DocumentId) -> Result<Document> {
        let path = self
            .locate(id)
            .await
            .ok_or_else(|| DkgError::DocumentNotFound(id.to_string()))?;

        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DkgError::FetchFailed {
                id: id.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;

        let title = extract_title(&text).unwrap_or_else(|| id.to_string());
        Ok(Document {
            id: id.clone(),
            title,
            text,
        })
    }

    fn name(&self) -> &str {
        "directory"
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

/// First markdown heading of a document, if it has one
fn extract_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.strip_prefix('#'))
        .map(|heading| heading.trim_matches('#').trim().to_string())
        .filter(|heading| !heading.is_empty())
}

// ============================================================================
// Memory Source
// ============================================================================

/// In-memory documents, listed in insertion order
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: Vec<Document>,
}

impl MemorySource {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Add a document
    pub fn push(&mut self, document: Document) {
        self.documents.push(document);
    }

    /// Builder-style add
    pub fn with_document(mut self, document: Document) -> Self {
        self.push(document);
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn list_documents(&self) -> Result<Vec<DocumentId>> {
        Ok(self.documents.iter().map(|d| d.id.clone()).collect())
    }

    async fn fetch(&self, id: &DocumentId) -> Result<Document> {
        self.documents
            .iter()
            .find(|d| &d.id == id)
            .cloned()
            .ok_or_else(|| DkgError::DocumentNotFound(id.to_string()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
