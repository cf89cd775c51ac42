use std::path::{Path, PathBuf};

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::application::IndexStats;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct AddDocumentsRequest {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: String,
}

/// Failures are part of the answer text, so this always returns 200 once the
/// query itself is well formed.
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryAnswer>, StatusCode> {
    if request.query.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let answer = state.knowledge_base.query(&request.query).await;
    Ok(Json(QueryAnswer { answer }))
}

/// Relative paths resolve against the documents directory. Any existing path
/// that resolves outside it refuses the whole request with 403.
pub async fn add_documents(
    State(state): State<AppState>,
    Json(request): Json<AddDocumentsRequest>,
) -> Result<Json<StatusMessage>, StatusCode> {
    let paths = confine_to_documents(state.knowledge_base.documents_dir(), &request.paths)
        .await
        .map_err(|path| {
            tracing::warn!(path = %path.display(), "refused document outside documents_dir");
            StatusCode::FORBIDDEN
        })?;

    let status = state.knowledge_base.add_documents(&paths).await;
    Ok(Json(StatusMessage { status }))
}

/// Canonicalizes each path and keeps those under `root`. Paths that do not
/// exist are dropped; the first one outside `root` is returned as the error.
async fn confine_to_documents(root: &Path, paths: &[PathBuf]) -> Result<Vec<PathBuf>, PathBuf> {
    let Ok(root) = tokio::fs::canonicalize(root).await else {
        return Ok(Vec::new());
    };

    let mut confined = Vec::with_capacity(paths.len());
    for path in paths {
        let Ok(resolved) = tokio::fs::canonicalize(root.join(path)).await else {
            continue;
        };
        if !resolved.starts_with(&root) {
            return Err(path.clone());
        }
        confined.push(resolved);
    }
    Ok(confined)
}

pub async fn refresh(State(state): State<AppState>) -> Json<StatusMessage> {
    let status = state.knowledge_base.refresh_index().await;
    Json(StatusMessage { status })
}

pub async fn stats(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.knowledge_base.stats().await)
}
