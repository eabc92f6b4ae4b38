use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use opalcms_core::{AppResult, JobId, TenantId};
use opalcms_domain::{
    AssetStrategy, DestinationSpace, JobConfig, JobItemError, JobProgress, JobStatus, MigrationJob,
    SourceSpace,
};
use serde::{Deserialize, Serialize};

/// Input for persisting one new migration job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJobInput {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Source space and credentials.
    pub source: SourceSpace,
    /// Destination scope.
    pub destination: DestinationSpace,
    /// User selections for this job.
    pub config: JobConfig,
    /// Source environment name kept for display.
    pub source_environment: String,
}

/// One migration request as submitted by the client: several source
/// environments fanned out into one job per environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Source space identifier.
    pub space_id: String,
    /// Management API token.
    pub cma_token: String,
    /// Delivery API token.
    pub cda_token: String,
    /// Source environments in the order the client submitted them.
    pub source_environments: Vec<String>,
    /// Content types the user selected across all environments.
    pub selected_content_type_ids: Vec<String>,
    /// Content type ids actually present, per environment name.
    pub content_type_presence: HashMap<String, BTreeSet<String>>,
    /// Destination scope shared by every job in the batch.
    pub destination: DestinationSpace,
    /// Asset migration strategy.
    pub asset_strategy: AssetStrategy,
}

/// Live view of one job's stored state.
pub type JobWatch = tokio::sync::watch::Receiver<MigrationJob>;

/// Stored-job operations the worker side needs: read one job, write
/// its progress and status.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Returns one job by id.
    async fn find_job(&self, job_id: &JobId) -> AppResult<Option<MigrationJob>>;

    /// Replaces a job's progress and item-error list.
    async fn save_progress(
        &self,
        job_id: &JobId,
        progress: JobProgress,
        errors: Vec<JobItemError>,
    ) -> AppResult<()>;

    /// Applies a status transition and returns the updated record.
    async fn set_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        message: Option<String>,
    ) -> AppResult<MigrationJob>;
}

/// Full repository port for migration job persistence.
#[async_trait]
pub trait JobRepository: JobStore {
    /// Persists a new pending job and returns the stored record.
    async fn create_job(&self, input: NewJobInput) -> AppResult<MigrationJob>;

    /// Lists the most recently created tenant jobs in the given
    /// statuses, newest first.
    async fn list_recent_jobs(
        &self,
        tenant_id: TenantId,
        statuses: &[JobStatus],
        limit: usize,
    ) -> AppResult<Vec<MigrationJob>>;

    /// Subscribes to stored-state changes for one job.
    async fn watch_job(&self, job_id: &JobId) -> AppResult<JobWatch>;
}

/// Port for asking the worker to pick up a pending job.
#[async_trait]
pub trait WorkerTrigger: Send + Sync {
    /// Requests execution of the given job.
    async fn trigger(&self, job_id: &JobId) -> AppResult<()>;
}

/// One item read from the source CMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Source item identifier.
    pub id: String,
    /// Display name for error reporting, when the source has one.
    pub display_name: Option<String>,
    /// Raw item payload forwarded to the destination.
    pub payload: serde_json::Value,
}

/// Result of importing one item at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The item was created.
    Created,
    /// The item already existed and was left untouched.
    Skipped,
}

/// Read port against the source CMS delivery/management APIs.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Lists the selected content type definitions.
    async fn list_content_types(
        &self,
        source: &SourceSpace,
        content_type_ids: &[String],
    ) -> AppResult<Vec<RemoteItem>>;

    /// Lists the ids of every content type present in the source
    /// environment.
    async fn list_environment_content_type_ids(
        &self,
        source: &SourceSpace,
    ) -> AppResult<BTreeSet<String>>;

    /// Lists all entries of the selected content types.
    async fn list_entries(
        &self,
        source: &SourceSpace,
        content_type_ids: &[String],
    ) -> AppResult<Vec<RemoteItem>>;

    /// Lists all assets in the source environment.
    async fn list_assets(&self, source: &SourceSpace) -> AppResult<Vec<RemoteItem>>;
}

/// Write port against the destination project.
#[async_trait]
pub trait DestinationWriter: Send + Sync {
    /// Imports one content type definition.
    async fn import_content_type(
        &self,
        destination: &DestinationSpace,
        item: &RemoteItem,
    ) -> AppResult<ImportOutcome>;

    /// Imports one asset.
    async fn import_asset(
        &self,
        destination: &DestinationSpace,
        item: &RemoteItem,
    ) -> AppResult<ImportOutcome>;

    /// Imports one entry.
    async fn import_entry(
        &self,
        destination: &DestinationSpace,
        item: &RemoteItem,
    ) -> AppResult<ImportOutcome>;
}
