use std::path::Path;

use crate::domain::{errors::DomainError, Document};
use async_trait::async_trait;

/// Extracts text from a file on disk.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    fn supports(&self, path: &Path) -> bool;

    async fn load(&self, path: &Path) -> Result<Document, DomainError>;
}
