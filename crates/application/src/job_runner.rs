use std::collections::BTreeSet;
use std::sync::Arc;

use opalcms_core::{AppError, AppResult, JobId};
use opalcms_domain::{AssetStrategy, JobItemError, JobPhase, JobStatus, MigrationJob};
use serde_json::Value;

use crate::migration_ports::{
    DestinationWriter, ImportOutcome, JobStore, RemoteItem, SourceReader,
};

/// Executes one migration job phase by phase.
///
/// Item failures are recorded and skipped over; only a failure to list
/// items from the source fails the whole job. Cancellation is observed
/// at phase boundaries by re-reading the stored status.
pub struct JobRunner {
    jobs: Arc<dyn JobStore>,
    source: Arc<dyn SourceReader>,
    destination: Arc<dyn DestinationWriter>,
}

impl JobRunner {
    /// Creates a new job runner.
    #[must_use]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        source: Arc<dyn SourceReader>,
        destination: Arc<dyn DestinationWriter>,
    ) -> Self {
        Self {
            jobs,
            source,
            destination,
        }
    }

    /// Runs the job to completion, cancellation, or failure.
    ///
    /// Re-running a terminal job is a no-op so duplicate worker
    /// triggers are harmless.
    pub async fn run(&self, job_id: &JobId) -> AppResult<()> {
        let Some(stored) = self.jobs.find_job(job_id).await? else {
            return Err(AppError::NotFound(format!("job '{job_id}' does not exist")));
        };
        if stored.status.is_terminal() {
            tracing::info!(%job_id, status = stored.status.as_str(), "job already finished");
            return Ok(());
        }

        let mut job = if stored.status == JobStatus::Pending {
            self.jobs.set_status(job_id, JobStatus::Running, None).await?
        } else {
            stored
        };

        tracing::info!(
            %job_id,
            environment = job.source_environment,
            "starting migration job"
        );

        let content_types = match self
            .source
            .list_content_types(&job.source, &job.config.content_type_ids)
            .await
        {
            Ok(items) => items,
            Err(error) => return self.fail(job_id, error).await,
        };
        self.run_phase(&mut job, JobPhase::ContentTypes, &content_types)
            .await?;
        if self.cancelled(job_id).await? {
            return Ok(());
        }

        // Entries are listed once and reused: the asset phase needs
        // them to resolve linked assets, the entry phase imports them.
        let entries = match self
            .source
            .list_entries(&job.source, &job.config.content_type_ids)
            .await
        {
            Ok(items) => items,
            Err(error) => return self.fail(job_id, error).await,
        };

        let assets = match self.source.list_assets(&job.source).await {
            Ok(items) => items,
            Err(error) => return self.fail(job_id, error).await,
        };
        let assets = match job.config.asset_strategy {
            AssetStrategy::All => assets,
            AssetStrategy::Linked => {
                let linked = linked_asset_ids(&entries);
                assets
                    .into_iter()
                    .filter(|asset| linked.contains(asset.id.as_str()))
                    .collect()
            }
        };
        self.run_phase(&mut job, JobPhase::Assets, &assets).await?;
        if self.cancelled(job_id).await? {
            return Ok(());
        }

        self.run_phase(&mut job, JobPhase::Entries, &entries).await?;
        if self.cancelled(job_id).await? {
            return Ok(());
        }

        job.progress.enter_phase(JobPhase::Done)?;
        self.jobs
            .save_progress(job_id, job.progress.clone(), job.errors.clone())
            .await?;
        self.jobs
            .set_status(job_id, JobStatus::Completed, None)
            .await?;
        tracing::info!(%job_id, "migration job completed");

        Ok(())
    }

    async fn run_phase(
        &self,
        job: &mut MigrationJob,
        phase: JobPhase,
        items: &[RemoteItem],
    ) -> AppResult<()> {
        job.progress.enter_phase(phase)?;
        if let Some(counters) = job.progress.counters_mut(phase) {
            *counters = opalcms_domain::PhaseCounters::with_total(items.len() as u64);
        }

        for item in items {
            let outcome = match phase {
                JobPhase::ContentTypes => {
                    self.destination
                        .import_content_type(&job.destination, item)
                        .await
                }
                JobPhase::Assets => self.destination.import_asset(&job.destination, item).await,
                JobPhase::Entries => self.destination.import_entry(&job.destination, item).await,
                JobPhase::Pending | JobPhase::Done => continue,
            };

            let Some(counters) = job.progress.counters_mut(phase) else {
                continue;
            };
            match outcome {
                Ok(ImportOutcome::Created) => counters.record_completed(),
                Ok(ImportOutcome::Skipped) => counters.record_skipped(),
                Err(error) => {
                    counters.record_failed();
                    tracing::warn!(
                        job_id = %job.job_id,
                        phase = phase.as_str(),
                        item_id = item.id,
                        %error,
                        "item failed to migrate"
                    );
                    job.errors.push(JobItemError {
                        phase,
                        item_id: item.id.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        self.jobs
            .save_progress(&job.job_id, job.progress.clone(), job.errors.clone())
            .await
    }

    async fn cancelled(&self, job_id: &JobId) -> AppResult<bool> {
        let stored = self.jobs.find_job(job_id).await?;
        Ok(stored.is_some_and(|job| job.status == JobStatus::Cancelled))
    }

    async fn fail(&self, job_id: &JobId, error: AppError) -> AppResult<()> {
        self.jobs
            .set_status(job_id, JobStatus::Failed, Some(error.to_string()))
            .await?;
        Err(error)
    }
}

/// Collects the ids of every asset linked from the given entries.
///
/// An asset reference is any object whose `sys` is a `Link` of link
/// type `Asset`; plain link fields and rich-text embeds (embedded
/// asset blocks, asset hyperlinks) both carry that shape.
#[must_use]
pub fn linked_asset_ids(entries: &[RemoteItem]) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for entry in entries {
        collect_asset_links(&entry.payload, &mut ids);
    }
    ids
}

fn collect_asset_links(value: &Value, ids: &mut BTreeSet<String>) {
    match value {
        Value::Object(object) => {
            if let Some(Value::Object(sys)) = object.get("sys") {
                let is_asset_link = sys.get("type").and_then(Value::as_str) == Some("Link")
                    && sys.get("linkType").and_then(Value::as_str) == Some("Asset");
                if is_asset_link {
                    if let Some(id) = sys.get("id").and_then(Value::as_str) {
                        ids.insert(id.to_owned());
                    }
                }
            }
            for nested in object.values() {
                collect_asset_links(nested, ids);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_asset_links(item, ids);
            }
        }
        _ => {}
    }
}
