use async_trait::async_trait;
use opalcms_application::{DestinationWriter, ImportOutcome, RemoteItem};
use opalcms_core::{AppError, AppResult};
use opalcms_domain::DestinationSpace;
use reqwest::{StatusCode, header};

/// Imports items into the destination project over its management
/// HTTP API.
///
/// A conflict response means the item already exists at the
/// destination; it is reported as skipped so interrupted jobs can be
/// re-run without duplicating work.
pub struct HttpDestinationWriter {
    http_client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpDestinationWriter {
    /// Creates a new destination writer.
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: String, api_token: String) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_token,
        }
    }

    fn item_url(&self, destination: &DestinationSpace, collection: &str, item_id: &str) -> String {
        format!(
            "{}/projects/{}/environments/{}/{collection}/{item_id}",
            self.base_url, destination.project_id, destination.environment_id
        )
    }

    async fn import(
        &self,
        destination: &DestinationSpace,
        collection: &str,
        item: &RemoteItem,
    ) -> AppResult<ImportOutcome> {
        let url = self.item_url(destination, collection, item.id.as_str());
        let response = self
            .http_client
            .put(url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.api_token),
            )
            .header("X-Opal-Tenant", destination.tenant_id.to_string())
            .json(&item.payload)
            .send()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to call destination API: {error}"))
            })?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Ok(ImportOutcome::Skipped);
        }
        if status.is_success() {
            return Ok(ImportOutcome::Created);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_owned());
        Err(AppError::Unavailable(format!(
            "destination API returned status {} for {collection} '{}': {body}",
            status.as_u16(),
            item.id
        )))
    }
}

#[async_trait]
impl DestinationWriter for HttpDestinationWriter {
    async fn import_content_type(
        &self,
        destination: &DestinationSpace,
        item: &RemoteItem,
    ) -> AppResult<ImportOutcome> {
        self.import(destination, "content-types", item).await
    }

    async fn import_asset(
        &self,
        destination: &DestinationSpace,
        item: &RemoteItem,
    ) -> AppResult<ImportOutcome> {
        self.import(destination, "assets", item).await
    }

    async fn import_entry(
        &self,
        destination: &DestinationSpace,
        item: &RemoteItem,
    ) -> AppResult<ImportOutcome> {
        self.import(destination, "entries", item).await
    }
}
