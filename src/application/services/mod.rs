mod document;
mod knowledge_base;
mod rag;
mod task_runner;

pub use document::DocumentService;
pub use knowledge_base::{
    Citation, IndexHandle, IndexStats, KnowledgeBase, KnowledgeBaseSettings, QueryResponse,
    SynthesisPrompts,
};
pub use rag::RagService;
pub use task_runner::{CrewRunner, TaskRunner};
