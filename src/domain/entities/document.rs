use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Citation label used when a chunk carries no source file name.
pub const UNKNOWN_SOURCE: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub path: PathBuf,
    pub text: String,
    pub metadata: DocumentMetadata,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    /// Builds a document for `path`. The id is derived from the path, so the
    /// same file always maps to the same document.
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self {
            id: document_id(&path),
            path,
            text: text.into(),
            metadata: DocumentMetadata {
                file_name,
                extension,
            },
            ingested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub extension: String,
}

pub fn document_id(path: &Path) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub chunk_index: usize,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    pub fn new(document_id: Uuid, content: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            id: Uuid::new_v5(&document_id, chunk_index.to_string().as_bytes()),
            document_id,
            content: content.into(),
            chunk_index,
            metadata: ChunkMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ChunkMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn source_name(&self) -> &str {
        if self.metadata.file_name.is_empty() {
            UNKNOWN_SOURCE
        } else {
            &self.metadata.file_name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_name: String,
    /// Offset of the chunk's first character within the document text.
    pub start_char: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Splits a document into fixed-size character windows.
///
/// Window `i` starts at `i * (chunk_size - chunk_overlap)`. Every chunk except
/// the last holds exactly `chunk_size` characters, so consecutive chunks share
/// exactly `chunk_overlap` characters. Counts are in Unicode scalar values.
pub fn chunk_content(
    document: &Document,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<DocumentChunk> {
    if chunk_size == 0 || document.text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = document.text.chars().collect();
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        let content: String = chars[start..end].iter().collect();
        let metadata = ChunkMetadata {
            file_name: document.metadata.file_name.clone(),
            start_char: start,
        };
        chunks.push(DocumentChunk::new(document.id, content, chunks.len()).with_metadata(metadata));

        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc(text: &str) -> Document {
        Document::new("/srv/docs/handbook.md", text)
    }

    #[test]
    fn test_chunk_content_single_chunk() {
        let chunks = chunk_content(&doc("Vacation policy: 20 days."), 512, 50);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Vacation policy: 20 days.");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].source_name(), "handbook.md");
    }

    #[test]
    fn test_chunk_content_overlap_windows() {
        let chunks = chunk_content(&doc("abcdefghij"), 4, 1);

        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["abcd", "defg", "ghij"]);
        assert_eq!(chunks[1].metadata.start_char, 3);
        assert_eq!(chunks[2].chunk_index, 2);
    }

    #[test]
    fn test_chunk_content_multibyte_text() {
        let chunks = chunk_content(&doc("héllo wörld ünïcode"), 6, 2);

        assert!(chunks.iter().all(|c| c.content.chars().count() <= 6));
        let first: String = chunks[0].content.chars().skip(4).collect();
        let second: String = chunks[1].content.chars().take(2).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_chunk_content_empty() {
        assert!(chunk_content(&doc(""), 100, 10).is_empty());
        assert!(chunk_content(&doc("  \n\t "), 100, 10).is_empty());
    }

    #[test]
    fn test_ids_are_stable_across_runs() {
        let a = chunk_content(&doc("stable identifiers please"), 8, 2);
        let b = chunk_content(&doc("stable identifiers please"), 8, 2);

        assert_eq!(a[0].document_id, b[0].document_id);
        assert_eq!(
            a.iter().map(|c| c.id).collect::<Vec<_>>(),
            b.iter().map(|c| c.id).collect::<Vec<_>>()
        );
        assert_ne!(a[0].id, a[1].id);
    }

    #[test]
    fn test_document_metadata_from_path() {
        let document = Document::new("/srv/docs/Policy.PDF", "text");
        assert_eq!(document.metadata.file_name, "Policy.PDF");
        assert_eq!(document.metadata.extension, "pdf");
        assert_eq!(document.id, document_id(Path::new("/srv/docs/Policy.PDF")));
    }

    proptest! {
        #[test]
        fn consecutive_chunks_share_exactly_overlap(
            text in "[a-z ]{1,400}",
            size in 2usize..64,
            overlap_seed in 0usize..64,
        ) {
            let overlap = overlap_seed % size;
            let document = doc(&text);
            let chunks = chunk_content(&document, size, overlap);

            for pair in chunks.windows(2) {
                let prev: Vec<char> = pair[0].content.chars().collect();
                let next: Vec<char> = pair[1].content.chars().collect();
                prop_assert_eq!(prev.len(), size);
                prop_assert_eq!(&prev[size - overlap..], &next[..overlap.min(next.len())]);
            }

            let again = chunk_content(&document, size, overlap);
            prop_assert_eq!(chunks, again);
        }
    }
}
