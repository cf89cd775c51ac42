mod agent;
mod document_loader;
mod embedding;
mod llm;
mod tool;
mod vector_store;

pub use agent::AgentExecutor;
pub use document_loader::DocumentLoader;
pub use embedding::EmbeddingService;
pub use llm::LlmService;
pub use tool::{CrewTool, ToolRequest};
pub use vector_store::VectorStore;
