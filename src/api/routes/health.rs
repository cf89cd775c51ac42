use axum::{extract::State, http::StatusCode, Json};
use deadpool_redis::redis::cmd;
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub redis: String,
    pub index_initialized: bool,
    pub crews: usize,
    pub tools: usize,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

async fn redis_connected(state: &AppState) -> bool {
    match state.redis_pool.get().await {
        Ok(mut conn) => {
            let ping: Result<String, _> = cmd("PING").query_async(&mut *conn).await;
            ping.is_ok()
        }
        Err(_) => false,
    }
}

/// Ready once Redis answers. The document index builds lazily, so it is
/// reported but not required.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    if !redis_connected(&state).await {
        tracing::warn!("readiness check failed: redis unreachable");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(ReadinessResponse {
        status: "ready".into(),
        redis: "connected".into(),
        index_initialized: state.knowledge_base.stats().await.initialized,
        crews: state.crews.len(),
        tools: state.tools.names().len(),
    }))
}
