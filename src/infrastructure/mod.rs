pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod crews;
pub mod embedding;
pub mod llm;
pub mod loader;
pub mod queue;
pub mod tools;
pub mod vector_store;

pub use agent::CrewAgent;
pub use bootstrap::Services;
pub use config::{AppConfig, Config, PromptsConfig};
pub use crews::CrewCatalog;
pub use embedding::{HashingEmbedding, TextEmbedding};
pub use llm::{LlmClient, RigLlm};
pub use loader::FileDocumentLoader;
pub use queue::{keys, queues, JobResult, QueueJobStatus, RunCrewJob};
pub use tools::{FileReadTool, FileWriteTool, InternalDocRagTool, ToolRegistry};
pub use vector_store::{LocalVectorStore, QdrantVectorStore};
