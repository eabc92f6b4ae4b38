use std::collections::BTreeSet;

use async_trait::async_trait;
use opalcms_application::{RemoteItem, SourceReader};
use opalcms_core::{AppError, AppResult};
use opalcms_domain::SourceSpace;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://cdn.contentful.com";
const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    items: Vec<Value>,
    total: u64,
}

/// Reads content types, entries, and assets from a Contentful-style
/// delivery API, following collection pagination.
pub struct CdaSourceReader {
    http_client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl CdaSourceReader {
    /// Creates a reader against the public delivery API.
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self::with_base_url(http_client, DEFAULT_BASE_URL.to_owned())
    }

    /// Creates a reader against a custom delivery API host.
    #[must_use]
    pub fn with_base_url(http_client: reqwest::Client, base_url: String) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    fn collection_url(&self, source: &SourceSpace, collection: &str) -> String {
        format!(
            "{}/spaces/{}/environments/{}/{collection}",
            self.base_url, source.space_id, source.environment
        )
    }

    async fn fetch_collection(
        &self,
        source: &SourceSpace,
        collection: &str,
        extra_query: &[(&str, String)],
    ) -> AppResult<Vec<RemoteItem>> {
        let url = self.collection_url(source, collection);
        let mut items = Vec::new();
        let mut skip = 0_usize;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("access_token", source.cda_token.clone()),
                ("limit", self.page_size.to_string()),
                ("skip", skip.to_string()),
            ];
            query.extend_from_slice(extra_query);

            let response = self
                .http_client
                .get(&url)
                .query(&query)
                .send()
                .await
                .map_err(|error| {
                    AppError::Unavailable(format!("failed to call source delivery API: {error}"))
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_owned());
                return Err(AppError::Unavailable(format!(
                    "source delivery API returned status {} for '{collection}': {body}",
                    status.as_u16()
                )));
            }

            let page = response.json::<CollectionResponse>().await.map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to parse source delivery API response: {error}"
                ))
            })?;

            let page_len = page.items.len();
            items.extend(page.items.into_iter().filter_map(remote_item));

            skip += page_len;
            if page_len == 0 || skip as u64 >= page.total {
                break;
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl SourceReader for CdaSourceReader {
    async fn list_content_types(
        &self,
        source: &SourceSpace,
        content_type_ids: &[String],
    ) -> AppResult<Vec<RemoteItem>> {
        if content_type_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.fetch_collection(
            source,
            "content_types",
            &[("sys.id[in]", content_type_ids.join(","))],
        )
        .await
    }

    async fn list_environment_content_type_ids(
        &self,
        source: &SourceSpace,
    ) -> AppResult<BTreeSet<String>> {
        let items = self.fetch_collection(source, "content_types", &[]).await?;
        Ok(items.into_iter().map(|item| item.id).collect())
    }

    async fn list_entries(
        &self,
        source: &SourceSpace,
        content_type_ids: &[String],
    ) -> AppResult<Vec<RemoteItem>> {
        // The delivery API filters entries by one content type per
        // query, so selected types are fetched one after another.
        let mut entries = Vec::new();
        for content_type_id in content_type_ids {
            let page = self
                .fetch_collection(
                    source,
                    "entries",
                    &[
                        ("content_type", content_type_id.clone()),
                        ("include", "0".to_owned()),
                    ],
                )
                .await?;
            entries.extend(page);
        }

        Ok(entries)
    }

    async fn list_assets(&self, source: &SourceSpace) -> AppResult<Vec<RemoteItem>> {
        self.fetch_collection(source, "assets", &[]).await
    }
}

fn remote_item(value: Value) -> Option<RemoteItem> {
    let id = value
        .get("sys")
        .and_then(|sys| sys.get("id"))
        .and_then(Value::as_str);
    let Some(id) = id else {
        tracing::warn!("skipping source item without a sys.id");
        return None;
    };

    let display_name = value
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_owned);

    Some(RemoteItem {
        id: id.to_owned(),
        display_name,
        payload: value,
    })
}
