use std::collections::BTreeSet;
use std::sync::Arc;

use opalcms_core::{AppError, AppResult, JobId};
use opalcms_domain::{JobConfig, SourceSpace};

use crate::migration_ports::{JobRepository, MigrationRequest, NewJobInput};
use crate::security_ports::{AuditAction, AuditEvent, AuditRepository};

/// Fans one migration request out into per-environment jobs.
#[derive(Clone)]
pub struct JobFactory {
    jobs: Arc<dyn JobRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl JobFactory {
    /// Creates a new job factory.
    #[must_use]
    pub fn new(jobs: Arc<dyn JobRepository>, audit_repository: Arc<dyn AuditRepository>) -> Self {
        Self {
            jobs,
            audit_repository,
        }
    }

    /// Creates one pending job per source environment, in request
    /// order.
    ///
    /// Each job carries only the selected content types actually
    /// present in its environment; an environment with an empty
    /// intersection is skipped rather than given an empty job. A
    /// persistence error aborts the remainder of the batch and is not
    /// rolled back, so already-created jobs survive.
    pub async fn create_batch(&self, request: MigrationRequest) -> AppResult<Vec<JobId>> {
        if request.source_environments.is_empty() {
            return Err(AppError::Validation(
                "at least one source environment is required".to_owned(),
            ));
        }
        if request.selected_content_type_ids.is_empty() {
            return Err(AppError::Validation(
                "at least one content type must be selected".to_owned(),
            ));
        }

        let empty = BTreeSet::new();
        let mut job_ids = Vec::new();

        for environment in &request.source_environments {
            let present = request
                .content_type_presence
                .get(environment)
                .unwrap_or(&empty);
            let content_type_ids: Vec<String> = request
                .selected_content_type_ids
                .iter()
                .filter(|id| present.contains(id.as_str()))
                .cloned()
                .collect();

            if content_type_ids.is_empty() {
                tracing::info!(
                    environment,
                    "skipping environment with no selected content types present"
                );
                continue;
            }

            let job = self
                .jobs
                .create_job(NewJobInput {
                    tenant_id: request.tenant_id,
                    source: SourceSpace {
                        space_id: request.space_id.clone(),
                        environment: environment.clone(),
                        cma_token: request.cma_token.clone(),
                        cda_token: request.cda_token.clone(),
                    },
                    destination: request.destination.clone(),
                    config: JobConfig {
                        content_type_ids,
                        asset_strategy: request.asset_strategy,
                    },
                    source_environment: environment.clone(),
                })
                .await?;

            job_ids.push(job.job_id);
        }

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id: request.tenant_id,
                subject: "system".to_owned(),
                action: AuditAction::MigrationBatchCreated,
                resource_type: "migration_batch".to_owned(),
                resource_id: request.space_id.clone(),
                detail: Some(format!(
                    "created {} migration job(s) from space '{}'",
                    job_ids.len(),
                    request.space_id
                )),
            })
            .await?;

        Ok(job_ids)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use opalcms_core::{AppResult, JobId, TenantId};
    use opalcms_domain::{
        AssetStrategy, DestinationSpace, JobItemError, JobProgress, JobStatus, MigrationJob,
    };
    use tokio::sync::Mutex;

    use crate::migration_ports::{JobRepository, JobStore, JobWatch, MigrationRequest, NewJobInput};
    use crate::security_ports::{AuditEvent, AuditRepository};

    use super::JobFactory;

    #[derive(Default)]
    struct FakeAuditRepository {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[async_trait]
    impl AuditRepository for FakeAuditRepository {
        async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
            self.events.lock().await.push(event);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeJobRepository {
        created: Mutex<Vec<MigrationJob>>,
    }

    #[async_trait]
    impl JobStore for FakeJobRepository {
        async fn find_job(&self, _job_id: &JobId) -> AppResult<Option<MigrationJob>> {
            Ok(None)
        }

        async fn save_progress(
            &self,
            _job_id: &JobId,
            _progress: JobProgress,
            _errors: Vec<JobItemError>,
        ) -> AppResult<()> {
            Ok(())
        }

        async fn set_status(
            &self,
            _job_id: &JobId,
            _status: JobStatus,
            _message: Option<String>,
        ) -> AppResult<MigrationJob> {
            Err(opalcms_core::AppError::Internal("unused".to_owned()))
        }
    }

    #[async_trait]
    impl JobRepository for FakeJobRepository {
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
            self.created.lock().await.push(job.clone());
            Ok(job)
        }

        async fn list_recent_jobs(
            &self,
            _tenant_id: TenantId,
            _statuses: &[JobStatus],
            _limit: usize,
        ) -> AppResult<Vec<MigrationJob>> {
            Ok(Vec::new())
        }

        async fn watch_job(&self, _job_id: &JobId) -> AppResult<JobWatch> {
            Err(opalcms_core::AppError::Internal("unused".to_owned()))
        }
    }

    fn request(
        environments: Vec<&str>,
        selected: Vec<&str>,
        presence: Vec<(&str, Vec<&str>)>,
    ) -> MigrationRequest {
        let tenant_id = TenantId::new();
        MigrationRequest {
            tenant_id,
            space_id: "space-1".to_owned(),
            cma_token: "cma".to_owned(),
            cda_token: "cda".to_owned(),
            source_environments: environments.into_iter().map(str::to_owned).collect(),
            selected_content_type_ids: selected.into_iter().map(str::to_owned).collect(),
            content_type_presence: presence
                .into_iter()
                .map(|(environment, ids)| {
                    (
                        environment.to_owned(),
                        ids.into_iter().map(str::to_owned).collect::<BTreeSet<_>>(),
                    )
                })
                .collect::<HashMap<_, _>>(),
            destination: DestinationSpace {
                project_id: "proj-1".to_owned(),
                environment_id: "env-1".to_owned(),
                tenant_id,
            },
            asset_strategy: AssetStrategy::Linked,
        }
    }

    #[tokio::test]
    async fn environment_without_selected_types_is_skipped() {
        let jobs = Arc::new(FakeJobRepository::default());
        let factory = JobFactory::new(jobs.clone(), Arc::new(FakeAuditRepository::default()));

        let job_ids = factory
            .create_batch(request(
                vec!["master", "staging"],
                vec!["article"],
                vec![("master", vec!["article", "page"]), ("staging", vec![])],
            ))
            .await;

        assert_eq!(job_ids.unwrap_or_default().len(), 1);
        let created = jobs.created.lock().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].source_environment, "master");
    }

    #[tokio::test]
    async fn jobs_carry_only_present_content_types_in_request_order() {
        let jobs = Arc::new(FakeJobRepository::default());
        let factory = JobFactory::new(jobs.clone(), Arc::new(FakeAuditRepository::default()));

        let job_ids = factory
            .create_batch(request(
                vec!["staging", "master"],
                vec!["article", "page", "landing"],
                vec![
                    ("master", vec!["article", "page"]),
                    ("staging", vec!["page"]),
                ],
            ))
            .await;

        assert_eq!(job_ids.unwrap_or_default().len(), 2);
        let created = jobs.created.lock().await;
        assert_eq!(created[0].source_environment, "staging");
        assert_eq!(created[0].config.content_type_ids, vec!["page".to_owned()]);
        assert_eq!(created[1].source_environment, "master");
        assert_eq!(
            created[1].config.content_type_ids,
            vec!["article".to_owned(), "page".to_owned()]
        );
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let factory = JobFactory::new(
            Arc::new(FakeJobRepository::default()),
            Arc::new(FakeAuditRepository::default()),
        );

        let result = factory
            .create_batch(request(vec!["master"], vec![], vec![("master", vec![])]))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_environment_counts_as_empty_presence() {
        let jobs = Arc::new(FakeJobRepository::default());
        let factory = JobFactory::new(jobs.clone(), Arc::new(FakeAuditRepository::default()));

        let job_ids = factory
            .create_batch(request(
                vec!["master", "preview"],
                vec!["article"],
                vec![("master", vec!["article"])],
            ))
            .await;

        assert_eq!(job_ids.unwrap_or_default().len(), 1);
    }
}
