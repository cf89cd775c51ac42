use std::collections::HashSet;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config, Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder,
    Distance, Filter, GetCollectionInfoResponse, PointId, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    ports::VectorStore, ChunkMetadata, DocumentChunk, DomainError, Embedding, SearchResult,
};

const SCROLL_PAGE: u32 = 256;

pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    pub fn new(url: &str) -> Result<Self, DomainError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(Self { client })
    }

    fn payload(chunk: &DocumentChunk) -> Result<Payload, DomainError> {
        serde_json::json!({
            "chunk_id": chunk.id.to_string(),
            "document_id": chunk.document_id.to_string(),
            "content": chunk.content,
            "chunk_index": chunk.chunk_index,
            "file_name": chunk.metadata.file_name,
            "start_char": chunk.metadata.start_char,
        })
        .try_into()
        .map_err(|_| DomainError::internal("Failed to create payload"))
    }

    fn chunk_from_payload(
        payload: &std::collections::HashMap<String, qdrant_client::qdrant::Value>,
    ) -> Option<DocumentChunk> {
        let id: Uuid = payload.get("chunk_id")?.as_str()?.parse().ok()?;
        let document_id: Uuid = payload.get("document_id")?.as_str()?.parse().ok()?;
        let content = payload.get("content")?.as_str()?.to_string();
        let chunk_index = payload.get("chunk_index")?.as_integer()? as usize;
        let file_name = payload
            .get("file_name")
            .and_then(|v| v.as_str())
            .cloned()
            .unwrap_or_default();
        let start_char = payload
            .get("start_char")
            .and_then(|v| v.as_integer())
            .unwrap_or_default() as usize;

        Some(DocumentChunk {
            id,
            document_id,
            content,
            chunk_index,
            metadata: ChunkMetadata {
                file_name,
                start_char,
            },
        })
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn open_collection(&self, collection: &str, dimension: usize) -> Result<(), DomainError> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        if exists {
            let info = self
                .client
                .collection_info(collection)
                .await
                .map_err(|e| DomainError::external(e.to_string()))?;
            return match stored_dimension(&info) {
                Some(stored) if stored == dimension as u64 => Ok(()),
                Some(stored) => Err(DomainError::config(format!(
                    "collection '{collection}' stores {stored}-dimensional vectors but the embedder produces {dimension}"
                ))),
                None => Err(DomainError::config(format!(
                    "collection '{collection}' has no single unnamed vector configuration"
                ))),
            };
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection).vectors_config(VectorParamsBuilder::new(
                    dimension as u64,
                    Distance::Cosine,
                )),
            )
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;
        info!(collection, dimension, "created qdrant collection");

        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        entries: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        if entries.is_empty() {
            return Ok(());
        }

        let points = entries
            .iter()
            .map(|(chunk, embedding)| {
                Ok(PointStruct::new(
                    chunk.id.to_string(),
                    embedding.as_slice().to_vec(),
                    Self::payload(chunk)?,
                ))
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, query.as_slice().to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .filter_map(|point| {
                Self::chunk_from_payload(&point.payload).map(|chunk| SearchResult {
                    chunk,
                    score: point.score,
                })
            })
            .collect())
    }

    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: Uuid,
    ) -> Result<(), DomainError> {
        let filter = Filter::must([Condition::matches("document_id", document_id.to_string())]);

        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(filter).wait(true))
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize, DomainError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn documents(&self, collection: &str) -> Result<usize, DomainError> {
        let mut ids: HashSet<String> = HashSet::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut request = ScrollPointsBuilder::new(collection)
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }

            let page = self
                .client
                .scroll(request)
                .await
                .map_err(|e| DomainError::external(e.to_string()))?;

            ids.extend(
                page.result
                    .iter()
                    .filter_map(|point| point.payload.get("document_id")?.as_str().cloned()),
            );

            match page.next_page_offset {
                Some(next) if next.point_id_options.is_some() => offset = Some(next),
                _ => break,
            }
        }

        Ok(ids.len())
    }
}

/// Vector size of a collection's single unnamed vector, if it has one.
fn stored_dimension(info: &GetCollectionInfoResponse) -> Option<u64> {
    let config = info
        .result
        .as_ref()?
        .config
        .as_ref()?
        .params
        .as_ref()?
        .vectors_config
        .as_ref()?
        .config
        .as_ref()?;
    match config {
        vectors_config::Config::Params(params) => Some(params.size),
        vectors_config::Config::ParamsMap(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::point_id::PointIdOptions;
    use qdrant_client::qdrant::{
        CollectionConfig, CollectionInfo, CollectionParams, VectorParams, VectorParamsMap,
        VectorsConfig,
    };

    fn info(config: vectors_config::Config) -> GetCollectionInfoResponse {
        GetCollectionInfoResponse {
            result: Some(CollectionInfo {
                config: Some(CollectionConfig {
                    params: Some(CollectionParams {
                        vectors_config: Some(VectorsConfig {
                            config: Some(config),
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_stored_dimension_reads_unnamed_vector_size() {
        let unnamed = info(vectors_config::Config::Params(VectorParams {
            size: 384,
            ..Default::default()
        }));
        let named = info(vectors_config::Config::ParamsMap(VectorParamsMap::default()));

        assert_eq!(stored_dimension(&unnamed), Some(384));
        assert_eq!(stored_dimension(&named), None);
        assert_eq!(stored_dimension(&GetCollectionInfoResponse::default()), None);
    }

    #[test]
    fn test_payload_round_trips_chunk_fields() {
        let chunk = DocumentChunk::new(Uuid::new_v4(), "Remote work is allowed two days a week.", 4)
            .with_metadata(ChunkMetadata {
                file_name: "remote.md".into(),
                start_char: 1848,
            });

        let payload: std::collections::HashMap<String, qdrant_client::qdrant::Value> =
            QdrantVectorStore::payload(&chunk).unwrap().into();

        assert_eq!(QdrantVectorStore::chunk_from_payload(&payload), Some(chunk));
    }

    #[test]
    fn test_point_ids_are_uuid_strings() {
        let id = Uuid::new_v4();
        let point = PointStruct::new(id.to_string(), vec![0.0f32; 2], Payload::new());

        assert!(matches!(
            point.id.and_then(|p| p.point_id_options),
            Some(PointIdOptions::Uuid(s)) if s == id.to_string()
        ));
    }
}
