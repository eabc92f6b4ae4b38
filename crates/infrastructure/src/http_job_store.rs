use async_trait::async_trait;
use opalcms_application::JobStore;
use opalcms_core::{AppError, AppResult, JobId};
use opalcms_domain::{JobItemError, JobProgress, JobStatus, MigrationJob};
use reqwest::{StatusCode, header};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SaveProgressRequest {
    progress: JobProgress,
    errors: Vec<JobItemError>,
}

#[derive(Debug, Serialize)]
struct SetStatusRequest {
    status: JobStatus,
    message: Option<String>,
}

/// Job store backed by the API service's internal job endpoints.
///
/// The worker has no direct store access; it reads and writes jobs
/// through the API, authenticated with the shared worker secret.
pub struct HttpJobStore {
    http_client: reqwest::Client,
    api_base_url: String,
    shared_secret: String,
}

impl HttpJobStore {
    /// Creates a new API-backed job store.
    #[must_use]
    pub fn new(http_client: reqwest::Client, api_base_url: String, shared_secret: String) -> Self {
        Self {
            http_client,
            api_base_url: api_base_url.trim_end_matches('/').to_owned(),
            shared_secret,
        }
    }

    fn job_url(&self, job_id: &JobId, suffix: &str) -> String {
        format!("{}/internal/jobs/{job_id}{suffix}", self.api_base_url)
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.shared_secret)
    }

    async fn read_error(response: reqwest::Response, context: &str) -> AppError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_owned());
        AppError::Unavailable(format!(
            "{context} returned status {}: {body}",
            status.as_u16()
        ))
    }
}

#[async_trait]
impl JobStore for HttpJobStore {
    async fn find_job(&self, job_id: &JobId) -> AppResult<Option<MigrationJob>> {
        let response = self
            .http_client
            .get(self.job_url(job_id, ""))
            .header(header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to call job endpoint: {error}"))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::read_error(response, "job endpoint").await);
        }

        let job = response.json::<MigrationJob>().await.map_err(|error| {
            AppError::Unavailable(format!("failed to parse job endpoint response: {error}"))
        })?;
        Ok(Some(job))
    }

    async fn save_progress(
        &self,
        job_id: &JobId,
        progress: JobProgress,
        errors: Vec<JobItemError>,
    ) -> AppResult<()> {
        let response = self
            .http_client
            .put(self.job_url(job_id, "/progress"))
            .header(header::AUTHORIZATION, self.authorization())
            .json(&SaveProgressRequest { progress, errors })
            .send()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to call job progress endpoint: {error}"))
            })?;

        if !response.status().is_success() {
            return Err(Self::read_error(response, "job progress endpoint").await);
        }

        Ok(())
    }

    async fn set_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        message: Option<String>,
    ) -> AppResult<MigrationJob> {
        let response = self
            .http_client
            .put(self.job_url(job_id, "/status"))
            .header(header::AUTHORIZATION, self.authorization())
            .json(&SetStatusRequest { status, message })
            .send()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to call job status endpoint: {error}"))
            })?;

        if response.status() == StatusCode::CONFLICT {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(AppError::Conflict(body));
        }
        if !response.status().is_success() {
            return Err(Self::read_error(response, "job status endpoint").await);
        }

        let job = response.json::<MigrationJob>().await.map_err(|error| {
            AppError::Unavailable(format!(
                "failed to parse job status endpoint response: {error}"
            ))
        })?;
        Ok(job)
    }
}
