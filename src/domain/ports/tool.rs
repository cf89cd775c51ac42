use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolRequest {
    pub request: String,
    #[serde(default)]
    pub context: Option<String>,
}

impl ToolRequest {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// A capability agents can call. Tools always answer with text; failures are
/// reported in the returned string rather than as errors.
#[async_trait]
pub trait CrewTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn execute(&self, request: &ToolRequest) -> String;
}
