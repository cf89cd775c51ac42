use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::ports::{CrewTool, ToolRequest};

/// Resolves `requested` inside `workspace`. Absolute paths and `..` are
/// refused so tools cannot reach outside the workspace.
fn confine(workspace: &Path, requested: &str) -> Result<PathBuf, String> {
    let requested = requested.trim();
    if requested.is_empty() {
        return Err("Error: a file path is required".to_string());
    }

    let relative = Path::new(requested);
    let escapes = relative.components().any(|c| {
        matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
    });
    if escapes {
        return Err(format!("Error: path '{requested}' is outside the workspace"));
    }

    Ok(workspace.join(relative))
}

/// Reads a text file from the workspace. The request is the relative path.
pub struct FileReadTool {
    workspace: PathBuf,
}

impl FileReadTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl CrewTool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file in the shared workspace. \
         Provide the file path relative to the workspace."
    }

    async fn execute(&self, request: &ToolRequest) -> String {
        let path = match confine(&self.workspace, &request.request) {
            Ok(path) => path,
            Err(message) => return message,
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => format!("Error reading file {}: {e}", request.request.trim()),
        }
    }
}

/// Writes a text file in the workspace. The request is the relative path and
/// the context is the content to write.
pub struct FileWriteTool {
    workspace: PathBuf,
}

impl FileWriteTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    async fn write(&self, path: &Path, content: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await
    }
}

#[async_trait]
impl CrewTool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write text to a file in the shared workspace, replacing any existing \
         content. Provide the relative file path as the request and the file \
         content as the context."
    }

    async fn execute(&self, request: &ToolRequest) -> String {
        let path = match confine(&self.workspace, &request.request) {
            Ok(path) => path,
            Err(message) => return message,
        };
        let content = request.context.as_deref().unwrap_or_default();

        match self.write(&path, content).await {
            Ok(()) => {
                debug!(path = %path.display(), bytes = content.len(), "wrote workspace file");
                format!(
                    "Successfully wrote {} bytes to {}",
                    content.len(),
                    request.request.trim()
                )
            }
            Err(e) => format!("Error writing file {}: {e}", request.request.trim()),
        }
    }
}
