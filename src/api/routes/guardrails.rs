use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::domain::guardrails::{GuardrailSet, GuardrailSpec};

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub text: String,
    #[serde(default)]
    pub guardrails: Vec<GuardrailSpec>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub passed: bool,
    pub detail: String,
    pub checked: Vec<String>,
}

pub async fn validate(
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, StatusCode> {
    if let Some(reason) = request.guardrails.iter().find_map(|spec| spec.check().err()) {
        tracing::warn!(reason, "rejected guardrail spec");
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let set = GuardrailSet::from_specs(&request.guardrails);
    let checked = set.names().into_iter().map(str::to_string).collect();
    let (passed, detail) = set.validate(&request.text).into_parts();

    Ok(Json(ValidateResponse {
        passed,
        detail,
        checked,
    }))
}
