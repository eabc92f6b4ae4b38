use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, State};
use opalcms_application::{BatchSummary, JobStore, MigrationRequest};
use opalcms_core::{AppError, JobId};
use opalcms_domain::{JobStatus, SourceSpace};

use crate::dto::{JobResponse, StartMigrationRequest, StartMigrationResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn start_migration_handler(
    State(state): State<AppState>,
    Json(payload): Json<StartMigrationRequest>,
) -> ApiResult<Json<StartMigrationResponse>> {
    let source: SourceSpace = payload.source.into();
    let environment = source.environment.clone();

    // Selection is intersected against what the source actually has.
    let present_ids = state
        .source_reader
        .list_environment_content_type_ids(&source)
        .await?;
    let mut presence = HashMap::new();
    presence.insert(environment.clone(), present_ids);

    let destination: opalcms_domain::DestinationSpace = payload.destination.into();
    let request = MigrationRequest {
        tenant_id: destination.tenant_id,
        space_id: source.space_id,
        cma_token: source.cma_token,
        cda_token: source.cda_token,
        source_environments: vec![environment.clone()],
        selected_content_type_ids: payload.config.content_type_ids,
        content_type_presence: presence,
        destination,
        asset_strategy: payload.config.asset_strategy,
    };

    let job_ids = state.job_factory.create_batch(request).await?;
    if job_ids.is_empty() {
        return Err(AppError::Validation(format!(
            "none of the selected content types exist in environment '{environment}'"
        ))
        .into());
    }

    let jobs = state.sequencer.start_batch(job_ids).await?;
    state.sequencer.subscribe_all().await?;

    let job_id = jobs
        .first()
        .map(|job| job.job_id.to_string())
        .ok_or_else(|| AppError::Internal("batch creation produced no jobs".to_owned()))?;

    Ok(Json(StartMigrationResponse { job_id }))
}

pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job_id = JobId::parse(job_id.as_str())?;
    let job = state
        .job_repository
        .find_job(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' not found")))?;

    Ok(Json(JobResponse::from(job)))
}

pub async fn batch_summary_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<BatchSummary>> {
    let summary = state
        .sequencer
        .summary()
        .await
        .ok_or_else(|| AppError::NotFound("no active migration batch".to_owned()))?;

    Ok(Json(summary))
}

pub async fn cancel_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job_id = JobId::parse(job_id.as_str())?;
    let job = state
        .job_repository
        .find_job(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' not found")))?;

    if job.status != JobStatus::Cancelled {
        state
            .job_repository
            .set_status(&job_id, JobStatus::Cancelled, None)
            .await?;
    }

    // Stops chaining and cancels the remaining jobs of the batch.
    state.sequencer.cancel().await?;

    let job = state
        .job_repository
        .find_job(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' not found")))?;

    Ok(Json(JobResponse::from(job)))
}
