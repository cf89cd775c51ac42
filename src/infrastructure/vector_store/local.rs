use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{ports::VectorStore, DocumentChunk, DomainError, Embedding, SearchResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    chunk: DocumentChunk,
    embedding: Embedding,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    dimension: usize,
    chunks: BTreeMap<Uuid, StoredChunk>,
    /// Changed since the last write to disk.
    #[serde(skip)]
    dirty: bool,
}

/// Vector store kept in memory and mirrored to one JSON file per collection
/// under `dir`. Writes stay in memory until `flush`; reopening a collection
/// after a restart loads the last flushed file.
pub struct LocalVectorStore {
    dir: PathBuf,
    collections: RwLock<HashMap<String, Collection>>,
}

impl LocalVectorStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn path_for(&self, collection: &str) -> Result<PathBuf, DomainError> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(DomainError::validation(format!(
                "invalid collection name '{collection}'"
            )));
        }
        Ok(self.dir.join(format!("{collection}.json")))
    }

    /// Writes to a temporary file first so a crash never leaves a truncated
    /// collection behind.
    async fn persist(&self, name: &str, collection: &Collection) -> Result<(), DomainError> {
        let path = self.path_for(name)?;
        let bytes = serde_json::to_vec(collection)
            .map_err(|e| DomainError::internal(format!("serializing collection '{name}': {e}")))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(collection = name, chunks = collection.chunks.len(), "persisted collection");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Collection>, DomainError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                DomainError::internal(format!("corrupt collection file {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn not_open(collection: &str) -> DomainError {
    DomainError::not_found(format!("collection '{collection}' is not open"))
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn open_collection(&self, collection: &str, dimension: usize) -> Result<(), DomainError> {
        let mut collections = self.collections.write().await;

        if let Some(existing) = collections.get(collection) {
            return check_dimension(collection, existing.dimension, dimension);
        }

        let loaded = match self.load(collection).await? {
            Some(loaded) => {
                check_dimension(collection, loaded.dimension, dimension)?;
                info!(collection, chunks = loaded.chunks.len(), "reopened collection");
                loaded
            }
            None => {
                let created = Collection {
                    dimension,
                    ..Collection::default()
                };
                self.persist(collection, &created).await?;
                info!(collection, dimension, "created collection");
                created
            }
        };

        collections.insert(collection.to_string(), loaded);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        entries: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_open(collection))?;

        if let Some((chunk, embedding)) = entries
            .iter()
            .find(|(_, e)| e.dimension() != target.dimension)
        {
            return Err(DomainError::validation(format!(
                "chunk {} has dimension {}, collection '{collection}' expects {}",
                chunk.id,
                embedding.dimension(),
                target.dimension
            )));
        }

        for (chunk, embedding) in entries {
            target.chunks.insert(
                chunk.id,
                StoredChunk {
                    chunk: chunk.clone(),
                    embedding: embedding.clone(),
                },
            );
            target.dirty = true;
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| not_open(collection))?;

        let mut results: Vec<SearchResult> = target
            .chunks
            .values()
            .map(|stored| SearchResult {
                chunk: stored.chunk.clone(),
                score: query.cosine_similarity(&stored.embedding),
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: Uuid,
    ) -> Result<(), DomainError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_open(collection))?;

        let before = target.chunks.len();
        target.chunks.retain(|_, stored| stored.chunk.document_id != document_id);

        if target.chunks.len() != before {
            target.dirty = true;
        }
        Ok(())
    }

    async fn flush(&self, collection: &str) -> Result<(), DomainError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_open(collection))?;

        if target.dirty {
            self.persist(collection, target).await?;
            target.dirty = false;
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize, DomainError> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.chunks.len())
            .ok_or_else(|| not_open(collection))
    }

    async fn documents(&self, collection: &str) -> Result<usize, DomainError> {
        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| not_open(collection))?;
        let ids: HashSet<Uuid> = target.chunks.values().map(|s| s.chunk.document_id).collect();
        Ok(ids.len())
    }
}

fn check_dimension(collection: &str, stored: usize, requested: usize) -> Result<(), DomainError> {
    if stored == requested {
        Ok(())
    } else {
        Err(DomainError::config(format!(
            "collection '{collection}' stores {stored}-dimensional vectors but the embedder produces {requested}"
        )))
    }
}
