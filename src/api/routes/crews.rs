use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::infrastructure::{QueueJobStatus, RunCrewJob};

#[derive(Debug, Serialize)]
pub struct CrewSummary {
    pub name: String,
    pub description: String,
    pub agents: Vec<String>,
    pub tasks: Vec<String>,
    /// Inputs a run must supply.
    pub inputs: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunCrewRequest {
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct RunCrewResponse {
    pub job_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: QueueJobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

pub async fn list_crews(State(state): State<AppState>) -> Json<Vec<CrewSummary>> {
    Json(
        state
            .crews
            .iter()
            .map(|crew| CrewSummary {
                name: crew.name.clone(),
                description: crew.description.clone(),
                agents: crew.agents.iter().map(|a| a.name.clone()).collect(),
                tasks: crew.tasks.iter().map(|t| t.name.clone()).collect(),
                inputs: crew.placeholders(),
            })
            .collect(),
    )
}

pub async fn run_crew(
    State(state): State<AppState>,
    Path(crew_name): Path<String>,
    Json(request): Json<RunCrewRequest>,
) -> Result<(StatusCode, Json<RunCrewResponse>), StatusCode> {
    let crew = state.crews.get(&crew_name).ok_or(StatusCode::NOT_FOUND)?;

    if let Some(err) = crew
        .tasks
        .iter()
        .find_map(|task| task.render(&request.inputs).err())
    {
        tracing::warn!(crew = %crew_name, error = %err, "rejected crew run");
        return Err(StatusCode::BAD_REQUEST);
    }

    let job = RunCrewJob::new(&crew_name).with_inputs(request.inputs);
    let job_id = state.job_producer.push_crew_job(&job).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to queue crew job");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RunCrewResponse {
            job_id,
            status: "queued".to_string(),
        }),
    ))
}

pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, StatusCode> {
    let result = state
        .job_producer
        .get_job_status(&job_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get job status");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match result {
        Some(job_result) => Ok(Json(JobStatusResponse {
            job_id: job_result.job_id,
            status: job_result.status,
            result: job_result.result,
            error: job_result.error,
        })),
        None => Err(StatusCode::NOT_FOUND),
    }
}
