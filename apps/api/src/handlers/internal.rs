use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use opalcms_application::JobStore;
use opalcms_core::{AppError, JobId};
use opalcms_domain::{JobItemError, JobProgress, JobStatus, MigrationJob};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SaveProgressRequest {
    progress: JobProgress,
    errors: Vec<JobItemError>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    status: JobStatus,
    message: Option<String>,
}

pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<MigrationJob>> {
    let job_id = JobId::parse(job_id.as_str())?;
    let job = state
        .job_repository
        .find_job(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' not found")))?;

    Ok(Json(job))
}

pub async fn save_progress_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(payload): Json<SaveProgressRequest>,
) -> ApiResult<StatusCode> {
    let job_id = JobId::parse(job_id.as_str())?;
    state
        .job_repository
        .save_progress(&job_id, payload.progress, payload.errors)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(payload): Json<SetStatusRequest>,
) -> ApiResult<Json<MigrationJob>> {
    let job_id = JobId::parse(job_id.as_str())?;
    let job = state
        .job_repository
        .set_status(&job_id, payload.status, payload.message)
        .await?;

    Ok(Json(job))
}
