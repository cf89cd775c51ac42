use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{
    ports::{EmbeddingService, VectorStore},
    DocumentChunk, DomainError, SearchResult,
};

/// Embedding and retrieval against one named collection.
pub struct RagService {
    embedding: Arc<dyn EmbeddingService>,
    vector_store: Arc<dyn VectorStore>,
    collection: String,
    default_top_k: usize,
}

impl RagService {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedding,
            vector_store,
            collection: collection.into(),
            default_top_k,
        }
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn open_collection(&self) -> Result<(), DomainError> {
        self.vector_store
            .open_collection(&self.collection, self.embedding.dimension())
            .await
    }

    #[instrument(skip(self), fields(top_k = self.default_top_k))]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>, DomainError> {
        self.retrieve_top_k(query, self.default_top_k).await
    }

    #[instrument(skip(self))]
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let embedding = self.embedding.embed(query).await?;
        self.vector_store
            .search(&self.collection, &embedding, top_k)
            .await
    }

    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    pub async fn index_chunks(&self, chunks: &[DocumentChunk]) -> Result<(), DomainError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = self.embedding.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(DomainError::external(format!(
                "embedding backend returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let entries: Vec<_> = chunks.iter().cloned().zip(embeddings).collect();
        self.vector_store.upsert(&self.collection, &entries).await
    }

    /// Drops whatever the collection holds for `document_id`, then indexes
    /// `chunks` in its place.
    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    pub async fn replace_document(
        &self,
        document_id: Uuid,
        chunks: &[DocumentChunk],
    ) -> Result<(), DomainError> {
        self.vector_store
            .delete_by_document(&self.collection, document_id)
            .await?;
        self.index_chunks(chunks).await
    }

    /// Persists writes made since the last flush.
    pub async fn flush(&self) -> Result<(), DomainError> {
        self.vector_store.flush(&self.collection).await
    }

    pub async fn chunk_count(&self) -> Result<usize, DomainError> {
        self.vector_store.count(&self.collection).await
    }

    pub async fn document_count(&self) -> Result<usize, DomainError> {
        self.vector_store.documents(&self.collection).await
    }
}
