use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use opalcms_application::{JobRepository, JobStore, JobWatch, NewJobInput};
use opalcms_core::{AppError, AppResult, JobId, TenantId};
use opalcms_domain::{JobItemError, JobProgress, JobStatus, MigrationJob};
use tokio::sync::{RwLock, watch};

/// In-memory migration job store with per-job change notification.
///
/// Every stored mutation is published on the job's watch channel so
/// sequencer subscriptions see the same snapshots an external store
/// would deliver.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, MigrationJob>>,
    watchers: RwLock<HashMap<JobId, watch::Sender<MigrationJob>>>,
}

impl InMemoryJobRepository {
    /// Creates an empty in-memory job store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            watchers: RwLock::new(HashMap::new()),
        }
    }

    async fn publish(&self, job: &MigrationJob) {
        let watchers = self.watchers.read().await;
        if let Some(sender) = watchers.get(&job.job_id) {
            // Send only fails when no receiver exists, which is fine.
            let _ = sender.send(job.clone());
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobRepository {
    async fn find_job(&self, job_id: &JobId) -> AppResult<Option<MigrationJob>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn save_progress(
        &self,
        job_id: &JobId,
        progress: JobProgress,
        errors: Vec<JobItemError>,
    ) -> AppResult<()> {
        let updated = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' does not exist")))?;
            job.progress = progress;
            job.errors = errors;
            job.clone()
        };

        self.publish(&updated).await;
        Ok(())
    }

    async fn set_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        message: Option<String>,
    ) -> AppResult<MigrationJob> {
        let updated = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' does not exist")))?;
            job.transition(status)?;
            if message.is_some() {
                job.message = message;
            }
            job.clone()
        };

        self.publish(&updated).await;
        Ok(updated)
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create_job(&self, input: NewJobInput) -> AppResult<MigrationJob> {
        let job = MigrationJob {
            job_id: JobId::new(),
            tenant_id: input.tenant_id,
            status: JobStatus::Pending,
            source: input.source,
            destination: input.destination,
            config: input.config,
            source_environment: input.source_environment,
            progress: JobProgress::default(),
            errors: Vec::new(),
            message: None,
            created_at: Utc::now(),
        };

        self.jobs
            .write()
            .await
            .insert(job.job_id.clone(), job.clone());
        let (sender, _) = watch::channel(job.clone());
        self.watchers.write().await.insert(job.job_id.clone(), sender);

        Ok(job)
    }

    async fn list_recent_jobs(
        &self,
        tenant_id: TenantId,
        statuses: &[JobStatus],
        limit: usize,
    ) -> AppResult<Vec<MigrationJob>> {
        let jobs = self.jobs.read().await;

        let mut values: Vec<MigrationJob> = jobs
            .values()
            .filter(|job| job.tenant_id == tenant_id && statuses.contains(&job.status))
            .cloned()
            .collect();
        values.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        values.truncate(limit);

        Ok(values)
    }

    async fn watch_job(&self, job_id: &JobId) -> AppResult<JobWatch> {
        let watchers = self.watchers.read().await;
        watchers
            .get(job_id)
            .map(watch::Sender::subscribe)
            .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' does not exist")))
    }
}

#[cfg(test)]
mod tests {
    use opalcms_application::{JobRepository, JobStore, NewJobInput};
    use opalcms_core::TenantId;
    use opalcms_domain::{
        AssetStrategy, DestinationSpace, JobConfig, JobStatus, MigrationJob, SourceSpace,
    };

    use super::InMemoryJobRepository;

    fn input(tenant_id: TenantId, environment: &str) -> NewJobInput {
        NewJobInput {
            tenant_id,
            source: SourceSpace {
                space_id: "space-1".to_owned(),
                environment: environment.to_owned(),
                cma_token: "cma".to_owned(),
                cda_token: "cda".to_owned(),
            },
            destination: DestinationSpace {
                project_id: "proj-1".to_owned(),
                environment_id: "env-1".to_owned(),
                tenant_id,
            },
            config: JobConfig {
                content_type_ids: vec!["article".to_owned()],
                asset_strategy: AssetStrategy::All,
            },
            source_environment: environment.to_owned(),
        }
    }

    async fn create(repository: &InMemoryJobRepository, tenant_id: TenantId) -> MigrationJob {
        repository
            .create_job(input(tenant_id, "master"))
            .await
            .unwrap_or_else(|_| unreachable!())
    }

    #[tokio::test]
    async fn created_jobs_start_pending() {
        let repository = InMemoryJobRepository::new();
        let job = create(&repository, TenantId::new()).await;

        assert_eq!(job.status, JobStatus::Pending);
        let stored = repository.find_job(&job.job_id).await.unwrap_or(None);
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn status_writes_enforce_the_lifecycle() {
        let repository = InMemoryJobRepository::new();
        let job = create(&repository, TenantId::new()).await;

        let running = repository
            .set_status(&job.job_id, JobStatus::Running, None)
            .await;
        assert!(running.is_ok());

        // Done phase was never reached.
        let completed = repository
            .set_status(&job.job_id, JobStatus::Completed, None)
            .await;
        assert!(completed.is_err());
    }

    #[tokio::test]
    async fn watchers_see_status_changes() {
        let repository = InMemoryJobRepository::new();
        let job = create(&repository, TenantId::new()).await;

        let mut watch = repository
            .watch_job(&job.job_id)
            .await
            .unwrap_or_else(|_| unreachable!());

        let cancelled = repository
            .set_status(&job.job_id, JobStatus::Cancelled, None)
            .await;
        assert!(cancelled.is_ok());

        assert!(watch.changed().await.is_ok());
        assert_eq!(watch.borrow().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn recent_listing_is_newest_first_and_status_filtered() {
        let repository = InMemoryJobRepository::new();
        let tenant_id = TenantId::new();

        let first = create(&repository, tenant_id).await;
        let second = create(&repository, tenant_id).await;
        let cancelled = repository
            .set_status(&first.job_id, JobStatus::Cancelled, None)
            .await;
        assert!(cancelled.is_ok());

        let pending = repository
            .list_recent_jobs(tenant_id, &[JobStatus::Pending], 10)
            .await
            .unwrap_or_default();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job_id, second.job_id);
    }
}
