use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::api::state::AppState;
use crate::domain::ports::ToolRequest;
use crate::infrastructure::tools::ToolError;

#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ToolOutput {
    pub output: String,
}

pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolInfo>> {
    Json(
        state
            .tools
            .describe()
            .into_iter()
            .map(|(name, description)| ToolInfo {
                name: name.to_string(),
                description: description.to_string(),
            })
            .collect(),
    )
}

pub async fn run_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ToolRequest>,
) -> Result<Json<ToolOutput>, StatusCode> {
    match state.tools.execute(&name, &request).await {
        Ok(output) => Ok(Json(ToolOutput { output })),
        Err(ToolError::Unknown(_)) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(error = %e, tool = %name, "tool call failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
