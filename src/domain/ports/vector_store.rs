use crate::domain::{errors::DomainError, DocumentChunk, Embedding, SearchResult};
use async_trait::async_trait;
use uuid::Uuid;

/// Durable chunk storage with similarity search. Every call names the
/// collection it targets; a collection must be opened before use.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Opens an existing collection or creates it empty.
    async fn open_collection(&self, collection: &str, dimension: usize) -> Result<(), DomainError>;

    /// Inserts or replaces entries keyed by chunk id.
    async fn upsert(
        &self,
        collection: &str,
        entries: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError>;

    /// Returns at most `top_k` results ordered by descending score.
    async fn search(
        &self,
        collection: &str,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError>;

    async fn delete_by_document(&self, collection: &str, document_id: Uuid)
        -> Result<(), DomainError>;

    /// Makes earlier writes to the collection durable. Stores that write
    /// through on every call keep the default.
    async fn flush(&self, _collection: &str) -> Result<(), DomainError> {
        Ok(())
    }

    /// Number of chunks stored in the collection.
    async fn count(&self, collection: &str) -> Result<usize, DomainError>;

    /// Number of distinct documents the stored chunks belong to.
    async fn documents(&self, collection: &str) -> Result<usize, DomainError>;
}
