use std::sync::Arc;

use tracing::info;

use crate::application::{CrewRunner, KnowledgeBase, TaskRunner};
use crate::domain::ports::{EmbeddingService, VectorStore};
use crate::domain::DomainError;
use crate::infrastructure::agent::CrewAgent;
use crate::infrastructure::config::{AppConfig, EmbeddingProvider, VectorStoreBackend};
use crate::infrastructure::crews::CrewCatalog;
use crate::infrastructure::embedding::{HashingEmbedding, TextEmbedding};
use crate::infrastructure::llm::{LlmClient, RigLlm};
use crate::infrastructure::loader::FileDocumentLoader;
use crate::infrastructure::tools::{
    CrewDelegationTool, FileReadTool, FileWriteTool, InternalDocRagTool, RunnerSlot, ToolRegistry,
};
use crate::infrastructure::vector_store::{LocalVectorStore, QdrantVectorStore};

/// Everything the API and the worker share, wired from one `AppConfig`.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<AppConfig>,
    pub knowledge_base: Arc<KnowledgeBase>,
    pub tools: Arc<ToolRegistry>,
    pub crews: Arc<CrewCatalog>,
    runner: Arc<CrewRunner>,
}

impl Services {
    pub fn build(config: AppConfig) -> Result<Self, DomainError> {
        let cfg = &config.config;

        let embedding: Arc<dyn EmbeddingService> = match cfg.embedding.provider {
            EmbeddingProvider::Hashing => Arc::new(HashingEmbedding::new(cfg.embedding.dimension)),
            EmbeddingProvider::OpenAi => Arc::new(TextEmbedding::from_config(&cfg.embedding)?),
        };

        let vector_store: Arc<dyn VectorStore> = match cfg.vector_store.backend {
            VectorStoreBackend::Local => Arc::new(LocalVectorStore::new(&cfg.rag.persist_dir)),
            VectorStoreBackend::Qdrant => {
                Arc::new(QdrantVectorStore::new(&cfg.vector_store.qdrant_url)?)
            }
        };

        let llm_client = LlmClient::from_env(cfg.llm.provider)?;
        let llm = RigLlm::from_config(&cfg.llm)?;

        let knowledge_base = Arc::new(
            KnowledgeBase::new(
                cfg.rag.settings(),
                Arc::new(FileDocumentLoader::new()),
                embedding,
                vector_store,
                Arc::new(llm),
            )?
            .with_prompts(config.prompts.synthesis()),
        );

        std::fs::create_dir_all(&cfg.crews.workspace_dir)?;
        let mut tools = ToolRegistry::new()
            .with(InternalDocRagTool::new(knowledge_base.clone()))?
            .with(FileReadTool::new(&cfg.crews.workspace_dir))?
            .with(FileWriteTool::new(&cfg.crews.workspace_dir))?;

        let crews = CrewCatalog::load_dir(&cfg.crews.dir, &tools.names())?;

        let slot = RunnerSlot::default();
        for crew in crews.delegable() {
            if let Some(tool) = CrewDelegationTool::new(crew.clone(), slot.clone()) {
                tools.register(Arc::new(tool))?;
            }
        }
        let tools = Arc::new(tools);

        let agent = CrewAgent::new(llm_client, &cfg.llm, tools.clone());
        let runner = Arc::new(CrewRunner::new(TaskRunner::new(
            Arc::new(agent),
            cfg.crews.max_retries,
        )));
        slot.set(Arc::downgrade(&runner))
            .map_err(|_| DomainError::internal("crew runner already set"))?;

        info!(
            crews = crews.len(),
            tools = ?tools.names(),
            embedding = ?cfg.embedding.provider,
            vector_store = ?cfg.vector_store.backend,
            "services ready"
        );

        Ok(Self {
            config: Arc::new(config),
            knowledge_base,
            tools,
            crews: Arc::new(crews),
            runner,
        })
    }

    /// The shared crew runner. Delegation tools run sub-crews through it too.
    pub fn crew_runner(&self) -> Arc<CrewRunner> {
        self.runner.clone()
    }
}
