use std::sync::Arc;

use async_trait::async_trait;

use crate::application::KnowledgeBase;
use crate::domain::ports::{CrewTool, ToolRequest};

pub const INTERNAL_DOC_RAG: &str = "internal_document_rag";

/// Question answering over the internal document index.
pub struct InternalDocRagTool {
    knowledge_base: Arc<KnowledgeBase>,
}

impl InternalDocRagTool {
    pub fn new(knowledge_base: Arc<KnowledgeBase>) -> Self {
        Self { knowledge_base }
    }
}

#[async_trait]
impl CrewTool for InternalDocRagTool {
    fn name(&self) -> &str {
        INTERNAL_DOC_RAG
    }

    fn description(&self) -> &str {
        "Search and query internal company documents. Use this tool to find \
         information from internal policies, procedures, technical documentation, \
         and other company knowledge base materials. Provide a clear question or \
         search query."
    }

    async fn execute(&self, request: &ToolRequest) -> String {
        let query = match request.context.as_deref().map(str::trim) {
            Some(context) if !context.is_empty() => format!("{} ({context})", request.request.trim()),
            _ => request.request.clone(),
        };
        self.knowledge_base.query(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::KnowledgeBaseSettings;
    use crate::domain::{ports::LlmService, DomainError};
    use crate::infrastructure::{FileDocumentLoader, HashingEmbedding, LocalVectorStore};

    struct EchoLlm;

    #[async_trait]
    impl LlmService for EchoLlm {
        async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
            Ok(prompt.to_string())
        }

        async fn complete_with_system(&self, _system: &str, _prompt: &str) -> Result<String, DomainError> {
            Ok("The handbook says 20 days.".to_string())
        }
    }

    #[tokio::test]
    async fn test_tool_returns_formatted_answer() {
        let dir = tempfile::tempdir().unwrap();
        let settings = KnowledgeBaseSettings {
            documents_dir: dir.path().join("docs"),
            persist_dir: dir.path().join("docs/storage"),
            ..KnowledgeBaseSettings::default()
        };
        std::fs::create_dir_all(&settings.documents_dir).unwrap();
        std::fs::write(settings.documents_dir.join("handbook.md"), "Vacation: 20 days per year.").unwrap();
        let store = Arc::new(LocalVectorStore::new(&settings.persist_dir));
        let kb = KnowledgeBase::new(
            settings,
            Arc::new(FileDocumentLoader::new()),
            Arc::new(HashingEmbedding::new(64)),
            store,
            Arc::new(EchoLlm),
        )
        .unwrap();
        let tool = InternalDocRagTool::new(Arc::new(kb));

        let output = tool.execute(&ToolRequest::new("How much vacation?")).await;

        assert_eq!(tool.name(), "internal_document_rag");
        assert!(output.starts_with("Answer: The handbook says 20 days.\n\nSources:\n1. handbook.md (relevance: "));
    }
}
