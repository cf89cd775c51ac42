mod crew;
mod document;
mod embedding;

pub use crew::{AgentSpec, CrewRunReport, CrewSpec, Delegation, Process, TaskOutcome, TaskSpec};
pub use document::{
    chunk_content, document_id, ChunkMetadata, Document, DocumentChunk, DocumentMetadata,
    SearchResult, UNKNOWN_SOURCE,
};
pub use embedding::Embedding;
