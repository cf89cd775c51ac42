mod crew_delegation;
mod files;
mod internal_docs;
mod rig_adapter;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{
    ports::{CrewTool, ToolRequest},
    DomainError,
};

pub use crew_delegation::{CrewDelegationTool, RunnerSlot};
pub use files::{FileReadTool, FileWriteTool};
pub use internal_docs::InternalDocRagTool;
pub use rig_adapter::RigToolAdapter;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool '{0}' is already registered")]
    Duplicate(String),

    #[error("Unknown tool '{0}'")]
    Unknown(String),

    #[error("Tool failed: {0}")]
    Failed(String),
}

impl From<ToolError> for DomainError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Unknown(_) => DomainError::not_found(err.to_string()),
            ToolError::Duplicate(_) => DomainError::config(err.to_string()),
            ToolError::Failed(_) => DomainError::external(err.to_string()),
        }
    }
}

/// Tools agents may be given, looked up by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn CrewTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn CrewTool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn with(mut self, tool: impl CrewTool + 'static) -> Result<Self, ToolError> {
        self.register(Arc::new(tool))?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CrewTool>> {
        self.tools.get(name).cloned()
    }

    /// Looks up every name, failing on the first unknown one.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn CrewTool>>, ToolError> {
        names
            .iter()
            .map(|name| self.get(name).ok_or_else(|| ToolError::Unknown(name.clone())))
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn describe(&self) -> Vec<(&str, &str)> {
        self.tools
            .values()
            .map(|tool| (tool.name(), tool.description()))
            .collect()
    }

    pub async fn execute(&self, name: &str, request: &ToolRequest) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        Ok(tool.execute(request).await)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
