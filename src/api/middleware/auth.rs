use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::api::state::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Rejects requests without a configured `X-API-Key`. With no keys
/// configured every request passes.
pub async fn api_key_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let allowed = &state.config.config.auth.api_keys;
    if allowed.is_empty() {
        return Ok(next.run(request).await);
    }

    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match api_key {
        Some(key) if allowed.iter().any(|k| k == key) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(uri = %request.uri(), "invalid api key");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
