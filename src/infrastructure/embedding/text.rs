use async_trait::async_trait;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::embeddings::EmbeddingsBuilder;
use rig::providers::openai;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};
use crate::infrastructure::config::EmbeddingConfig;

/// Inputs per embeddings request.
const MAX_BATCH: usize = 256;

/// Remote embeddings through the OpenAI API.
pub struct TextEmbedding {
    client: openai::Client,
    model: String,
    dimension: usize,
}

impl TextEmbedding {
    /// Fails when `OPENAI_API_KEY` is not set rather than at the first call.
    pub fn new() -> Result<Self, DomainError> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(DomainError::config(
                "OPENAI_API_KEY must be set to use openai embeddings",
            ));
        }

        Ok(Self {
            client: openai::Client::from_env(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, DomainError> {
        Ok(Self::new()?
            .with_model(&config.model)
            .with_dimension(config.dimension))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

#[async_trait]
impl EmbeddingService for TextEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::internal("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            let model = self.client.embedding_model(&self.model);

            let mut builder = EmbeddingsBuilder::new(model);
            for text in batch {
                builder = builder
                    .document(text.to_string())
                    .map_err(|e| DomainError::external(e.to_string()))?;
            }

            let embeddings = builder
                .build()
                .await
                .map_err(|e| DomainError::external(e.to_string()))?;

            for (_doc, emb) in embeddings {
                let vector: Vec<f32> = emb.first().vec.into_iter().map(|x| x as f32).collect();
                if vector.len() != self.dimension {
                    return Err(DomainError::config(format!(
                        "model '{}' returned {}-dimensional vectors but embedding.dimension is {}",
                        self.model,
                        vector.len(),
                        self.dimension
                    )));
                }
                vectors.push(Embedding::new(vector));
            }
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
