//! Lifecycle of the internal document index: discover, chunk, embed, store,
//! then answer questions with citations.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    ports::{DocumentLoader, EmbeddingService, LlmService, VectorStore},
    DomainError, SearchResult,
};

use super::{DocumentService, RagService};

#[derive(Debug, Clone)]
pub struct KnowledgeBaseSettings {
    pub documents_dir: PathBuf,
    /// Where the vector store keeps its files. Never scanned for documents.
    pub persist_dir: PathBuf,
    pub collection: String,
    pub extensions: Vec<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for KnowledgeBaseSettings {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("./shared/documents"),
            persist_dir: PathBuf::from("./shared/documents/storage"),
            collection: "internal_docs".to_string(),
            extensions: ["pdf", "txt", "md", "docx", "doc"].map(String::from).to_vec(),
            chunk_size: 512,
            chunk_overlap: 50,
            top_k: 3,
        }
    }
}

impl KnowledgeBaseSettings {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.chunk_size == 0 {
            return Err(DomainError::config("chunk_size must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DomainError::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(DomainError::config("top_k must be greater than zero"));
        }
        if self.extensions.is_empty() {
            return Err(DomainError::config("at least one document extension is required"));
        }
        if self.collection.trim().is_empty() {
            return Err(DomainError::config("collection name must not be empty"));
        }
        Ok(())
    }
}

/// Prompts used when turning retrieved chunks into an answer.
#[derive(Debug, Clone)]
pub struct SynthesisPrompts {
    pub system: String,
    /// Must contain `{context}` and `{query}`.
    pub template: String,
    /// Returned as-is when retrieval finds nothing.
    pub no_context_answer: String,
}

impl Default for SynthesisPrompts {
    fn default() -> Self {
        Self {
            system: "You answer questions using only the company's internal documents. \
                     If the documents do not contain the answer, say so."
                .to_string(),
            template: "Context information is below.\n\
                       ---------------------\n\
                       {context}\n\
                       ---------------------\n\
                       Given the context information and not prior knowledge, answer the query.\n\
                       Query: {query}\n\
                       Answer: "
                .to_string(),
            no_context_answer: "No relevant information was found in the internal documents."
                .to_string(),
        }
    }
}

impl SynthesisPrompts {
    fn render(&self, query: &str, context: &str) -> String {
        self.template
            .replace("{context}", context)
            .replace("{query}", query)
    }
}

/// Snapshot of a ready index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexHandle {
    pub collection: String,
    pub documents: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub collection: String,
    pub documents_dir: PathBuf,
    pub initialized: bool,
    pub documents: usize,
    pub chunks: usize,
}

#[derive(Debug)]
enum IndexState {
    Uninitialized,
    Ready(IndexHandle),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub file_name: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Citation>,
}

impl fmt::Display for QueryResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Answer: {}\n\n", self.answer)?;
        if !self.sources.is_empty() {
            writeln!(f, "Sources:")?;
            for (i, source) in self.sources.iter().enumerate() {
                writeln!(f, "{}. {} (relevance: {:.2})", i + 1, source.file_name, source.score)?;
            }
        }
        Ok(())
    }
}

pub struct KnowledgeBase {
    settings: KnowledgeBaseSettings,
    documents: DocumentService,
    rag: RagService,
    llm: Arc<dyn LlmService>,
    prompts: SynthesisPrompts,
    state: Mutex<IndexState>,
}

impl KnowledgeBase {
    /// Validates settings and prepares the directories. Nothing is indexed
    /// until the first call that needs the index.
    pub fn new(
        settings: KnowledgeBaseSettings,
        loader: Arc<dyn DocumentLoader>,
        embedding: Arc<dyn EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmService>,
    ) -> Result<Self, DomainError> {
        settings.validate()?;

        let mut settings = settings;
        settings.documents_dir = std::path::absolute(&settings.documents_dir)?;
        settings.persist_dir = std::path::absolute(&settings.persist_dir)?;
        std::fs::create_dir_all(&settings.documents_dir)?;
        std::fs::create_dir_all(&settings.persist_dir)?;

        let documents = DocumentService::new(
            loader,
            &settings.extensions,
            settings.chunk_size,
            settings.chunk_overlap,
        );
        let rag = RagService::new(
            embedding,
            vector_store,
            settings.collection.clone(),
            settings.top_k,
        );

        Ok(Self {
            settings,
            documents,
            rag,
            llm,
            prompts: SynthesisPrompts::default(),
            state: Mutex::new(IndexState::Uninitialized),
        })
    }

    pub fn with_prompts(mut self, prompts: SynthesisPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn documents_dir(&self) -> &Path {
        &self.settings.documents_dir
    }

    pub fn settings(&self) -> &KnowledgeBaseSettings {
        &self.settings
    }

    /// Returns the ready index, building it on first use. Concurrent first
    /// callers wait on the same lock, so the build runs once.
    pub async fn initialize(&self) -> Result<IndexHandle, DomainError> {
        let mut state = self.state.lock().await;
        if let IndexState::Ready(handle) = &*state {
            return Ok(handle.clone());
        }

        let handle = self.build_index().await?;
        *state = IndexState::Ready(handle.clone());
        Ok(handle)
    }

    #[instrument(skip(self), fields(collection = %self.settings.collection))]
    async fn build_index(&self) -> Result<IndexHandle, DomainError> {
        self.rag.open_collection().await?;

        let files = self
            .documents
            .discover(&self.settings.documents_dir, &self.settings.persist_dir);

        if files.is_empty() {
            warn!(
                dir = %self.settings.documents_dir.display(),
                "no documents found, index will start empty"
            );
        }

        let mut ingested = 0usize;
        for path in &files {
            match self.documents.ingest(path).await {
                Ok((document, chunks)) => {
                    self.rag.replace_document(document.id, &chunks).await?;
                    ingested += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping document"),
            }
        }
        self.rag.flush().await?;

        let handle = self.current_handle().await?;
        info!(
            scanned = files.len(),
            ingested,
            documents = handle.documents,
            chunks = handle.chunks,
            "index ready"
        );
        Ok(handle)
    }

    async fn current_handle(&self) -> Result<IndexHandle, DomainError> {
        Ok(IndexHandle {
            collection: self.settings.collection.clone(),
            documents: self.rag.document_count().await?,
            chunks: self.rag.chunk_count().await?,
        })
    }

    /// Answers `query` from the index. Failures come back as a readable
    /// message rather than an error.
    pub async fn query(&self, query: &str) -> String {
        match self.try_query(query).await {
            Ok(response) => response.to_string(),
            Err(e) => {
                error!(error = %e, "knowledge base query failed");
                format!(
                    "Error querying internal documents: {e}\n\n\
                     Please ensure documents are available in {}",
                    self.settings.documents_dir.display()
                )
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn try_query(&self, query: &str) -> Result<QueryResponse, DomainError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::validation("query must not be empty"));
        }

        self.initialize().await?;
        let results = self.rag.retrieve(query).await?;
        debug!(retrieved = results.len(), "retrieved chunks");

        if results.is_empty() {
            return Ok(QueryResponse {
                answer: self.prompts.no_context_answer.clone(),
                sources: Vec::new(),
            });
        }

        let prompt = self.prompts.render(query, &compact_context(&results));
        let answer = self
            .llm
            .complete_with_system(&self.prompts.system, &prompt)
            .await?;

        Ok(QueryResponse {
            answer: answer.trim().to_string(),
            sources: results
                .iter()
                .map(|r| Citation {
                    file_name: r.chunk.source_name().to_string(),
                    score: r.score,
                })
                .collect(),
        })
    }

    pub async fn add_documents(&self, paths: &[PathBuf]) -> String {
        match self.try_add_documents(paths).await {
            Ok(0) => "No valid documents found to add".to_string(),
            Ok(n) => format!("Successfully added {n} documents to the index"),
            Err(e) => {
                error!(error = %e, "adding documents failed");
                format!("Error adding documents: {e}")
            }
        }
    }

    /// Loads explicit files into the ready index and returns how many were
    /// added. Missing or unreadable paths are skipped.
    #[instrument(skip(self, paths), fields(requested = paths.len()))]
    pub async fn try_add_documents(&self, paths: &[PathBuf]) -> Result<usize, DomainError> {
        self.initialize().await?;

        let mut added = 0usize;
        for path in paths {
            if !path.is_file() || !self.documents.is_eligible(path) {
                debug!(path = %path.display(), "skipping missing or unsupported path");
                continue;
            }
            match self.documents.ingest(path).await {
                Ok((document, chunks)) => {
                    self.rag.replace_document(document.id, &chunks).await?;
                    added += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping document"),
            }
        }

        if added > 0 {
            self.rag.flush().await?;
            let handle = self.current_handle().await?;
            let mut state = self.state.lock().await;
            *state = IndexState::Ready(handle);
        }
        Ok(added)
    }

    pub async fn refresh_index(&self) -> String {
        match self.try_refresh().await {
            Ok(_) => "Index refreshed successfully".to_string(),
            Err(e) => {
                error!(error = %e, "index refresh failed");
                format!("Error refreshing index: {e}")
            }
        }
    }

    /// Drops the loaded handle and rebuilds from the persisted collection plus
    /// the current contents of the documents directory.
    pub async fn try_refresh(&self) -> Result<IndexHandle, DomainError> {
        let mut state = self.state.lock().await;
        *state = IndexState::Uninitialized;

        let handle = self.build_index().await?;
        *state = IndexState::Ready(handle.clone());
        Ok(handle)
    }

    pub async fn stats(&self) -> IndexStats {
        let state = self.state.lock().await;
        let (initialized, documents, chunks) = match &*state {
            IndexState::Uninitialized => (false, 0, 0),
            IndexState::Ready(handle) => (true, handle.documents, handle.chunks),
        };

        IndexStats {
            collection: self.settings.collection.clone(),
            documents_dir: self.settings.documents_dir.clone(),
            initialized,
            documents,
            chunks,
        }
    }
}

/// Every retrieved chunk goes into one prompt, labelled with its source.
fn compact_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("[{}]\n{}", r.chunk.source_name(), r.chunk.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{FileDocumentLoader, HashingEmbedding, LocalVectorStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmService for CountingLlm {
        async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
            self.complete_with_system("", prompt).await
        }

        async fn complete_with_system(&self, _system: &str, prompt: &str) -> Result<String, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.contains("Query:"));
            Ok("Employees receive 20 vacation days per year.".to_string())
        }
    }

    struct BrokenLlm;

    #[async_trait]
    impl LlmService for BrokenLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, DomainError> {
            Err(DomainError::external("backend unreachable"))
        }

        async fn complete_with_system(&self, _system: &str, _prompt: &str) -> Result<String, DomainError> {
            Err(DomainError::external("backend unreachable"))
        }
    }

    fn settings(root: &Path) -> KnowledgeBaseSettings {
        KnowledgeBaseSettings {
            documents_dir: root.join("documents"),
            persist_dir: root.join("documents/storage"),
            chunk_size: 64,
            chunk_overlap: 8,
            ..KnowledgeBaseSettings::default()
        }
    }

    fn knowledge_base(root: &Path, llm: Arc<dyn LlmService>) -> KnowledgeBase {
        let settings = settings(root);
        let store = Arc::new(LocalVectorStore::new(&settings.persist_dir));
        KnowledgeBase::new(
            settings,
            Arc::new(FileDocumentLoader::new()),
            Arc::new(HashingEmbedding::new(128)),
            store,
            llm,
        )
        .unwrap()
    }

    fn write_doc(root: &Path, name: &str, text: &str) -> PathBuf {
        let path = root.join("documents").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        path
    }

    #[tokio::test]
    async fn test_empty_directory_initializes_with_zero_documents() {
        let dir = tempfile::tempdir().unwrap();
        let kb = knowledge_base(dir.path(), Arc::new(CountingLlm::default()));

        let handle = kb.initialize().await.unwrap();

        assert_eq!(handle.documents, 0);
        assert_eq!(handle.chunks, 0);
        assert!(kb.stats().await.initialized);
    }

    #[tokio::test]
    async fn test_query_on_empty_index_has_no_sources() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(CountingLlm::default());
        let kb = knowledge_base(dir.path(), llm.clone());

        let output = kb.query("What is the vacation policy?").await;

        assert!(output.starts_with("Answer: No relevant information"));
        assert!(!output.contains("Sources:"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_cites_at_most_top_k_sources() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write_doc(
                dir.path(),
                &format!("policy-{i}.md"),
                &format!("Policy {i}: employees receive vacation days and sick leave. ").repeat(4),
            );
        }
        let llm = Arc::new(CountingLlm::default());
        let kb = knowledge_base(dir.path(), llm.clone());

        let output = kb.query("How many vacation days do employees get?").await;

        assert!(output.starts_with("Answer: Employees receive 20 vacation days per year.\n\nSources:\n"));
        let source_lines: Vec<&str> = output
            .lines()
            .skip_while(|l| *l != "Sources:")
            .skip(1)
            .filter(|l| !l.is_empty())
            .collect();
        assert_eq!(source_lines.len(), 3);
        let score_format = regex::Regex::new(r"^\d\. policy-\d\.md \(relevance: -?\d+\.\d{2}\)$").unwrap();
        assert!(source_lines.iter().all(|l| score_format.is_match(l)), "{source_lines:?}");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_add_nonexistent_path_reports_no_valid_documents() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "handbook.txt", "The office opens at nine.");
        let kb = knowledge_base(dir.path(), Arc::new(CountingLlm::default()));
        let before = kb.initialize().await.unwrap();

        let status = kb.add_documents(&[PathBuf::from("nonexistent/path.md")]).await;

        assert_eq!(status, "No valid documents found to add");
        assert_eq!(kb.stats().await.chunks, before.chunks);
    }

    #[tokio::test]
    async fn test_add_documents_counts_only_valid_paths() {
        let dir = tempfile::tempdir().unwrap();
        let kb = knowledge_base(dir.path(), Arc::new(CountingLlm::default()));
        kb.initialize().await.unwrap();

        let outside = tempfile::tempdir().unwrap();
        let valid = outside.path().join("benefits.md");
        std::fs::write(&valid, "Dental and vision coverage start on day one.").unwrap();
        let unsupported = outside.path().join("data.csv");
        std::fs::write(&unsupported, "a,b").unwrap();

        let status = kb
            .add_documents(&[valid, unsupported, PathBuf::from("missing.txt")])
            .await;

        assert_eq!(status, "Successfully added 1 documents to the index");
        let stats = kb.stats().await;
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);
    }

    #[tokio::test]
    async fn test_initialize_twice_does_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "guide.md", &"Expense reports are due monthly. ".repeat(10));
        let kb = knowledge_base(dir.path(), Arc::new(CountingLlm::default()));

        let first = kb.initialize().await.unwrap();
        let second = kb.initialize().await.unwrap();

        assert!(first.chunks > 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_new_files_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "guide.md", &"Expense reports are due monthly. ".repeat(10));
        let kb = knowledge_base(dir.path(), Arc::new(CountingLlm::default()));
        let before = kb.initialize().await.unwrap();

        write_doc(dir.path(), "nested/travel.txt", "Book travel through the portal.");
        assert_eq!(kb.refresh_index().await, "Index refreshed successfully");

        let stats = kb.stats().await;
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.chunks, before.chunks + 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initialize_builds_once() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            write_doc(dir.path(), &format!("policy_{i}.md"), &format!("Policy {i} covers remote work. ").repeat(8));
        }
        let kb = Arc::new(knowledge_base(dir.path(), Arc::new(CountingLlm::default())));

        let calls: Vec<_> = (0..8)
            .map(|_| {
                let kb = kb.clone();
                tokio::spawn(async move { kb.initialize().await })
            })
            .collect();
        let mut handles = Vec::new();
        for call in calls {
            handles.push(call.await.unwrap().unwrap());
        }

        assert!(handles.iter().all(|h| *h == handles[0]));
        assert_eq!(handles[0].documents, 10);
        assert_eq!(kb.initialize().await.unwrap(), handles[0]);
        assert_eq!(kb.stats().await.chunks, handles[0].chunks);
    }

    #[tokio::test]
    async fn test_reopening_collection_keeps_persisted_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let guide = write_doc(dir.path(), "guide.md", &"Expense reports are due monthly. ".repeat(10));
        let first = knowledge_base(dir.path(), Arc::new(CountingLlm::default()))
            .initialize()
            .await
            .unwrap();
        std::fs::remove_file(guide).unwrap();

        let reopened = knowledge_base(dir.path(), Arc::new(CountingLlm::default()))
            .initialize()
            .await
            .unwrap();

        assert_eq!(first, reopened);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "good.txt", "Payroll runs on the 25th.");
        write_doc(dir.path(), "blank.md", "   ");
        let kb = knowledge_base(dir.path(), Arc::new(CountingLlm::default()));

        let handle = kb.initialize().await.unwrap();

        assert_eq!(handle.documents, 1);
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_error_string() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "guide.md", "Expense reports are due monthly.");
        let kb = knowledge_base(dir.path(), Arc::new(BrokenLlm));

        let output = kb.query("When are expense reports due?").await;

        assert!(output.starts_with("Error querying internal documents: External service error: backend unreachable"));
        assert!(output.ends_with(&format!(
            "Please ensure documents are available in {}",
            kb.documents_dir().display()
        )));
    }

    #[tokio::test]
    async fn test_empty_query_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let kb = knowledge_base(dir.path(), Arc::new(CountingLlm::default()));

        assert!(kb.query("   ").await.starts_with("Error querying internal documents:"));
    }

    #[test]
    fn test_settings_reject_overlap_not_below_size() {
        let dir = tempfile::tempdir().unwrap();
        let settings = KnowledgeBaseSettings {
            chunk_size: 50,
            chunk_overlap: 50,
            ..settings(dir.path())
        };

        assert!(matches!(settings.validate(), Err(DomainError::Config(_))));
    }

    #[test]
    fn test_response_format() {
        let response = QueryResponse {
            answer: "Twenty days.".into(),
            sources: vec![
                Citation { file_name: "hr.pdf".into(), score: 0.876 },
                Citation { file_name: "Unknown".into(), score: 0.5 },
            ],
        };

        assert_eq!(
            response.to_string(),
            "Answer: Twenty days.\n\nSources:\n1. hr.pdf (relevance: 0.88)\n2. Unknown (relevance: 0.50)\n"
        );
    }
}
