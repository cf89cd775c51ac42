use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::domain::{chunk_content, ports::DocumentLoader, Document, DocumentChunk, DomainError};

/// Finds eligible files and turns them into chunked documents.
pub struct DocumentService {
    loader: Arc<dyn DocumentLoader>,
    extensions: Vec<String>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DocumentService {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        extensions: &[String],
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            loader,
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn is_eligible(&self, path: &Path) -> bool {
        let allowed = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext));
        allowed && self.loader.supports(path)
    }

    /// Recursively lists eligible files under `dir`, skipping anything inside
    /// `exclude`. Sorted so ingestion order is stable.
    pub fn discover(&self, dir: &Path, exclude: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_entry(|entry| !entry.path().starts_with(exclude))
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.is_eligible(path))
            .collect();

        files.sort();
        debug!(dir = %dir.display(), count = files.len(), "discovered documents");
        files
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn ingest(&self, path: &Path) -> Result<(Document, Vec<DocumentChunk>), DomainError> {
        let path = std::path::absolute(path)?;
        let document = self.loader.load(&path).await?;
        let chunks = chunk_content(&document, self.chunk_size, self.chunk_overlap);

        if chunks.is_empty() {
            return Err(DomainError::validation(format!(
                "no text extracted from {}",
                path.display()
            )));
        }

        debug!(chunks = chunks.len(), "chunked document");
        Ok((document, chunks))
    }
}
