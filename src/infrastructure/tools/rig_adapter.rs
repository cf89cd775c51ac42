use std::sync::Arc;

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ToolError;
use crate::domain::ports::{CrewTool, ToolRequest};

#[derive(Debug, Deserialize, Serialize)]
pub struct ToolArgs {
    pub request: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// Exposes a registry tool to a `rig` agent under the tool's own name.
pub struct RigToolAdapter {
    tool: Arc<dyn CrewTool>,
}

impl RigToolAdapter {
    pub fn new(tool: Arc<dyn CrewTool>) -> Self {
        Self { tool }
    }
}

impl Tool for RigToolAdapter {
    const NAME: &'static str = "crew_tool";

    type Error = ToolError;
    type Args = ToolArgs;
    type Output = String;

    fn name(&self) -> String {
        self.tool.name().to_string()
    }

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: self.tool.name().to_string(),
            description: self.tool.description().to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "request": {
                        "type": "string",
                        "description": "The question, search query, or file path for the tool"
                    },
                    "context": {
                        "type": "string",
                        "description": "Optional extra input, such as the content to write"
                    }
                },
                "required": ["request"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let request = ToolRequest {
            request: args.request,
            context: args.context,
        };
        let output = self.tool.execute(&request).await;
        if output.trim().is_empty() {
            return Err(ToolError::Failed(format!("{} returned no output", self.tool.name())));
        }
        Ok(output)
    }
}
