use async_trait::async_trait;
use opalcms_application::WorkerTrigger;
use opalcms_core::{AppError, AppResult, JobId};
use reqwest::header;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunJobRequest<'a> {
    job_id: &'a str,
}

/// HTTP-based worker trigger: asks the worker service to pick up a
/// pending job.
pub struct HttpWorkerTrigger {
    http_client: reqwest::Client,
    worker_base_url: String,
    shared_secret: String,
}

impl HttpWorkerTrigger {
    /// Creates a new worker trigger.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        worker_base_url: String,
        shared_secret: String,
    ) -> Self {
        Self {
            http_client,
            worker_base_url: worker_base_url.trim_end_matches('/').to_owned(),
            shared_secret,
        }
    }
}

#[async_trait]
impl WorkerTrigger for HttpWorkerTrigger {
    async fn trigger(&self, job_id: &JobId) -> AppResult<()> {
        let endpoint = format!("{}/v1/jobs/run", self.worker_base_url);
        let response = self
            .http_client
            .post(endpoint)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.shared_secret),
            )
            .json(&RunJobRequest {
                job_id: job_id.as_str(),
            })
            .send()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to call worker run endpoint: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(AppError::Unavailable(format!(
                "worker run endpoint returned status {}: {body}",
                status.as_u16()
            )));
        }

        Ok(())
    }
}
