//! REST handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use kyoku_models::{Job, JobId, RenderRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Response to a render submission.
#[derive(Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
}

/// Submit a render job. Returns 202 immediately; rendering happens
/// asynchronously under the concurrency cap.
pub async fn submit_render(
    State(state): State<AppState>,
    Json(request): Json<RenderRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let job_id = state.manager.submit(request).await?;
    info!(job_id = %job_id, "Render request accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job_id.to_string(),
            status: "queued".to_string(),
        }),
    ))
}

/// Fetch one job record.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state.manager.status(&JobId::from_string(job_id)).await?;
    Ok(Json(job))
}

#[derive(Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

/// List all known jobs, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    Json(JobListResponse {
        jobs: state.manager.list().await,
    })
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// Request cancellation of a job. Refused with 409 once the job is terminal.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let id = JobId::from_string(job_id);
    // Distinguish unknown jobs from already-terminal ones.
    state.manager.status(&id).await?;

    if !state.manager.cancel(&id).await {
        return Err(ApiError::conflict("job already finished"));
    }

    Ok(Json(CancelResponse {
        job_id: id.to_string(),
        cancelled: true,
    }))
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
