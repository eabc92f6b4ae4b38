use std::sync::Arc;

use opalcms_core::{AppResult, JobId, TenantId};
use opalcms_domain::{JobStatus, MigrationJob};
use tokio::sync::Mutex;

use crate::batch_sequencer::{BatchSequencer, SequencerEffect};
use crate::migration_ports::{JobRepository, WorkerTrigger};
use crate::progress::BatchSummary;

/// Two jobs created within this many seconds of each other belong to
/// the same batch. Batch membership is not persisted; it is recovered
/// from creation-time proximity.
pub const BATCH_WINDOW_SECONDS: i64 = 60;

/// How many recent jobs to scan when reconstructing a batch.
pub const RESUME_SCAN_LIMIT: usize = 20;

/// Drives one tenant's active migration batch against the job store
/// and the worker.
///
/// All sequencing decisions live in the pure [`BatchSequencer`]; this
/// service feeds it stored snapshots and executes the effects it
/// emits.
pub struct MigrationSequencer {
    jobs: Arc<dyn JobRepository>,
    trigger: Arc<dyn WorkerTrigger>,
    state: Mutex<Option<BatchSequencer>>,
}

impl MigrationSequencer {
    /// Creates a new sequencer with no active batch.
    #[must_use]
    pub fn new(jobs: Arc<dyn JobRepository>, trigger: Arc<dyn WorkerTrigger>) -> Self {
        Self {
            jobs,
            trigger,
            state: Mutex::new(None),
        }
    }

    /// Begins sequencing a freshly created batch.
    pub async fn start_batch(&self, job_ids: Vec<JobId>) -> AppResult<Vec<MigrationJob>> {
        let mut jobs = Vec::with_capacity(job_ids.len());
        for job_id in &job_ids {
            if let Some(job) = self.jobs.find_job(job_id).await? {
                jobs.push(job);
            }
        }

        let (sequencer, effects) = BatchSequencer::start(jobs.clone());
        *self.state.lock().await = Some(sequencer);
        self.run_effects(effects).await;

        Ok(jobs)
    }

    /// Reconstructs the most recent unfinished batch from storage.
    ///
    /// Scans recent jobs newest first; the newest non-terminal job
    /// anchors the batch and every job created within
    /// [`BATCH_WINDOW_SECONDS`] of it belongs to the batch. Returns
    /// `None` when no unfinished job exists.
    pub async fn resume(&self, tenant_id: TenantId) -> AppResult<Option<Vec<MigrationJob>>> {
        // Failed and cancelled jobs are fetched too: a pending job
        // behind one must stay untriggered, so the reducer has to see
        // the predecessor.
        let recent = self
            .jobs
            .list_recent_jobs(
                tenant_id,
                &[
                    JobStatus::Pending,
                    JobStatus::Running,
                    JobStatus::Completed,
                    JobStatus::Failed,
                    JobStatus::Cancelled,
                ],
                RESUME_SCAN_LIMIT,
            )
            .await?;

        let Some(anchor) = recent
            .iter()
            .find(|job| matches!(job.status, JobStatus::Pending | JobStatus::Running))
        else {
            return Ok(None);
        };

        let anchor_created_at = anchor.created_at;
        let batch: Vec<MigrationJob> = recent
            .into_iter()
            .filter(|job| {
                (job.created_at - anchor_created_at)
                    .num_seconds()
                    .abs()
                    <= BATCH_WINDOW_SECONDS
            })
            .collect();

        let (sequencer, effects) = BatchSequencer::resume(batch);
        let jobs = sequencer
            .jobs_in_order()
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        *self.state.lock().await = Some(sequencer);
        self.run_effects(effects).await;

        Ok(Some(jobs))
    }

    /// Applies one stored-state snapshot to the active batch.
    pub async fn observe(&self, snapshot: MigrationJob) {
        let effects = {
            let mut state = self.state.lock().await;
            match state.as_mut() {
                Some(sequencer) => sequencer.observe(snapshot),
                None => Vec::new(),
            }
        };
        self.run_effects(effects).await;
    }

    /// Cancels every unfinished job in the active batch and stops
    /// further chaining.
    ///
    /// Cancellation writes run sequentially in batch order. Already
    /// terminal jobs are left untouched, so repeated cancellation is
    /// harmless.
    pub async fn cancel(&self) -> AppResult<Vec<JobId>> {
        let targets = {
            let mut state = self.state.lock().await;
            match state.as_mut() {
                Some(sequencer) => sequencer.cancel_targets(),
                None => Vec::new(),
            }
        };

        for job_id in &targets {
            let updated = self
                .jobs
                .set_status(job_id, JobStatus::Cancelled, None)
                .await?;
            self.observe(updated).await;
        }

        Ok(targets)
    }

    /// Summarizes the active batch's progress, if any.
    pub async fn summary(&self) -> Option<BatchSummary> {
        let state = self.state.lock().await;
        state.as_ref().map(|sequencer| {
            let jobs = sequencer.jobs_in_order();
            BatchSummary::from_jobs(jobs.iter().map(|job| &job.progress))
        })
    }

    /// Forwards stored-state changes for every job in the active batch
    /// into [`Self::observe`].
    pub async fn subscribe_all(self: &Arc<Self>) -> AppResult<()> {
        let job_ids: Vec<JobId> = {
            let state = self.state.lock().await;
            match state.as_ref() {
                Some(sequencer) => sequencer
                    .jobs_in_order()
                    .into_iter()
                    .map(|job| job.job_id.clone())
                    .collect(),
                None => Vec::new(),
            }
        };

        for job_id in job_ids {
            let mut watch = self.jobs.watch_job(&job_id).await?;
            let sequencer = Arc::clone(self);
            tokio::spawn(async move {
                while watch.changed().await.is_ok() {
                    let snapshot = watch.borrow_and_update().clone();
                    sequencer.observe(snapshot).await;
                }
            });
        }

        Ok(())
    }

    async fn run_effects(&self, effects: Vec<SequencerEffect>) {
        for effect in effects {
            match effect {
                SequencerEffect::TriggerWorker(job_id) => {
                    // A failed trigger leaves the job pending; resume
                    // recovery will retry it later.
                    if let Err(error) = self.trigger.trigger(&job_id).await {
                        tracing::warn!(%job_id, %error, "worker trigger failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use opalcms_core::{AppError, AppResult, JobId, TenantId};
    use opalcms_domain::{
        AssetStrategy, DestinationSpace, JobConfig, JobItemError, JobPhase, JobProgress, JobStatus,
        MigrationJob, SourceSpace,
    };
    use tokio::sync::Mutex;

    use crate::migration_ports::{
        JobRepository, JobStore, JobWatch, NewJobInput, WorkerTrigger,
    };

    use super::MigrationSequencer;

    #[derive(Default)]
    struct FakeTrigger {
        triggered: Mutex<Vec<JobId>>,
        fail: bool,
    }

    #[async_trait]
    impl WorkerTrigger for FakeTrigger {
        async fn trigger(&self, job_id: &JobId) -> AppResult<()> {
            if self.fail {
                return Err(AppError::Unavailable("worker unreachable".to_owned()));
            }
            self.triggered.lock().await.push(job_id.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeJobRepository {
        jobs: Mutex<HashMap<JobId, MigrationJob>>,
    }

    impl FakeJobRepository {
        async fn seed(&self, job: MigrationJob) {
            self.jobs.lock().await.insert(job.job_id.clone(), job);
        }
    }

    #[async_trait]
    impl JobStore for FakeJobRepository {
        async fn find_job(&self, job_id: &JobId) -> AppResult<Option<MigrationJob>> {
            Ok(self.jobs.lock().await.get(job_id).cloned())
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
            job_id: &JobId,
            status: JobStatus,
            message: Option<String>,
        ) -> AppResult<MigrationJob> {
            let mut jobs = self.jobs.lock().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| AppError::NotFound(format!("job '{job_id}' does not exist")))?;
            job.transition(status)?;
            if message.is_some() {
                job.message = message;
            }
            Ok(job.clone())
        }
    }

    #[async_trait]
    impl JobRepository for FakeJobRepository {
        async fn create_job(&self, _input: NewJobInput) -> AppResult<MigrationJob> {
            Err(AppError::Internal("unused".to_owned()))
        }

        async fn list_recent_jobs(
            &self,
            tenant_id: TenantId,
            statuses: &[JobStatus],
            limit: usize,
        ) -> AppResult<Vec<MigrationJob>> {
            let mut jobs: Vec<MigrationJob> = self
                .jobs
                .lock()
                .await
                .values()
                .filter(|job| job.tenant_id == tenant_id && statuses.contains(&job.status))
                .cloned()
                .collect();
            jobs.sort_by(|left, right| right.created_at.cmp(&left.created_at));
            jobs.truncate(limit);
            Ok(jobs)
        }

        async fn watch_job(&self, _job_id: &JobId) -> AppResult<JobWatch> {
            Err(AppError::Internal("unused".to_owned()))
        }
    }

    fn job(
        tenant_id: TenantId,
        environment: &str,
        status: JobStatus,
        created_offset_secs: i64,
    ) -> MigrationJob {
        MigrationJob {
            job_id: JobId::new(),
            tenant_id,
            status,
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
            progress: JobProgress::default(),
            errors: Vec::new(),
            message: None,
            created_at: Utc::now() + Duration::seconds(created_offset_secs),
        }
    }

    #[tokio::test]
    async fn resume_reconstructs_only_the_batch_near_the_anchor() {
        let repository = Arc::new(FakeJobRepository::default());
        let tenant_id = TenantId::new();

        // Active batch: three jobs created seconds apart.
        repository
            .seed(job(tenant_id, "master", JobStatus::Completed, 0))
            .await;
        repository
            .seed(job(tenant_id, "staging", JobStatus::Running, 5))
            .await;
        repository
            .seed(job(tenant_id, "preview", JobStatus::Pending, 10))
            .await;
        // An older finished batch from ten minutes later must stay out.
        repository
            .seed(job(tenant_id, "old-a", JobStatus::Completed, 600))
            .await;
        repository
            .seed(job(tenant_id, "old-b", JobStatus::Completed, 605))
            .await;

        let sequencer = MigrationSequencer::new(repository, Arc::new(FakeTrigger::default()));
        let batch = sequencer.resume(tenant_id).await;

        let jobs = batch.unwrap_or_default().unwrap_or_default();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|job| !job.source_environment.starts_with("old")));
    }

    #[tokio::test]
    async fn resume_without_unfinished_jobs_finds_no_batch() {
        let repository = Arc::new(FakeJobRepository::default());
        let tenant_id = TenantId::new();
        repository
            .seed(job(tenant_id, "master", JobStatus::Completed, 0))
            .await;

        let sequencer = MigrationSequencer::new(repository, Arc::new(FakeTrigger::default()));
        let batch = sequencer.resume(tenant_id).await;
        assert!(batch.unwrap_or(Some(Vec::new())).is_none());
    }

    #[tokio::test]
    async fn cancel_twice_is_harmless_and_leaves_completed_jobs_untouched() {
        let repository = Arc::new(FakeJobRepository::default());
        let tenant_id = TenantId::new();
        let done = job(tenant_id, "master", JobStatus::Completed, 0);
        let pending = job(tenant_id, "staging", JobStatus::Pending, 5);
        let done_id = done.job_id.clone();
        repository.seed(done).await;
        repository.seed(pending).await;

        let sequencer = Arc::new(MigrationSequencer::new(
            repository.clone(),
            Arc::new(FakeTrigger::default()),
        ));
        let resumed = sequencer.resume(tenant_id).await;
        assert!(resumed.is_ok());

        let first = sequencer.cancel().await;
        assert_eq!(first.unwrap_or_default().len(), 1);

        let second = sequencer.cancel().await;
        assert!(second.unwrap_or_else(|_| vec![JobId::new()]).is_empty());

        let stored = repository.find_job(&done_id).await.unwrap_or(None);
        assert_eq!(stored.map(|job| job.status), Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn failed_trigger_leaves_the_job_pending() {
        let repository = Arc::new(FakeJobRepository::default());
        let tenant_id = TenantId::new();
        let pending = job(tenant_id, "master", JobStatus::Pending, 0);
        let pending_id = pending.job_id.clone();
        repository.seed(pending).await;

        let trigger = Arc::new(FakeTrigger {
            triggered: Mutex::new(Vec::new()),
            fail: true,
        });
        let sequencer = MigrationSequencer::new(repository.clone(), trigger);

        let resumed = sequencer.resume(tenant_id).await;
        assert!(resumed.is_ok());

        let stored = repository.find_job(&pending_id).await.unwrap_or(None);
        assert_eq!(stored.map(|job| job.status), Some(JobStatus::Pending));
    }

    #[tokio::test]
    async fn resume_does_not_chain_past_a_failed_job() {
        let repository = Arc::new(FakeJobRepository::default());
        let tenant_id = TenantId::new();
        let failed = job(tenant_id, "master", JobStatus::Failed, 0);
        let pending = job(tenant_id, "staging", JobStatus::Pending, 5);
        let pending_id = pending.job_id.clone();
        repository.seed(failed).await;
        repository.seed(pending).await;

        let trigger = Arc::new(FakeTrigger::default());
        let sequencer = MigrationSequencer::new(repository.clone(), trigger.clone());
        let resumed = sequencer.resume(tenant_id).await;
        assert!(resumed.is_ok());

        assert!(trigger.triggered.lock().await.is_empty());
        let stored = repository.find_job(&pending_id).await.unwrap_or(None);
        assert_eq!(stored.map(|job| job.status), Some(JobStatus::Pending));
    }

    #[tokio::test]
    async fn summary_aggregates_the_active_batch() {
        let repository = Arc::new(FakeJobRepository::default());
        let tenant_id = TenantId::new();

        let mut finished = job(tenant_id, "master", JobStatus::Completed, 0);
        finished.progress.phase = JobPhase::Done;
        finished.progress.entries.total = 6;
        finished.progress.entries.completed = 6;
        let mut running = job(tenant_id, "staging", JobStatus::Running, 5);
        running.progress.phase = JobPhase::Entries;
        running.progress.entries.total = 3;
        running.progress.entries.completed = 1;
        repository.seed(finished).await;
        repository.seed(running).await;

        let sequencer = MigrationSequencer::new(repository, Arc::new(FakeTrigger::default()));
        assert!(sequencer.summary().await.is_none());

        let resumed = sequencer.resume(tenant_id).await;
        assert!(resumed.is_ok());

        let summary = sequencer.summary().await;
        let summary = summary.unwrap_or_default();
        assert_eq!(summary.entries.total, 9);
        assert_eq!(summary.entries.completed, 7);
        assert!(!summary.all_complete);
    }

    #[tokio::test]
    async fn completion_snapshot_triggers_the_next_job() {
        let repository = Arc::new(FakeJobRepository::default());
        let tenant_id = TenantId::new();
        let first = job(tenant_id, "master", JobStatus::Pending, 0);
        let second = job(tenant_id, "staging", JobStatus::Pending, 5);
        let second_id = second.job_id.clone();
        repository.seed(first.clone()).await;
        repository.seed(second).await;

        let trigger = Arc::new(FakeTrigger::default());
        let sequencer = MigrationSequencer::new(repository, trigger.clone());
        let resumed = sequencer.resume(tenant_id).await;
        assert!(resumed.is_ok());

        let mut snapshot = first;
        snapshot.status = JobStatus::Running;
        sequencer.observe(snapshot.clone()).await;
        snapshot.status = JobStatus::Completed;
        sequencer.observe(snapshot).await;

        let triggered = trigger.triggered.lock().await;
        assert!(triggered.contains(&second_id));
    }
}
