use std::str::FromStr;

use chrono::{DateTime, Utc};
use opalcms_core::{AppError, AppResult, JobId, TenantId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of one migration job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, worker not yet started.
    Pending,
    /// Worker is executing the job.
    Running,
    /// All phases finished.
    Completed,
    /// Worker hit an unrecoverable error.
    Failed,
    /// Cancelled by the client.
    Cancelled,
}

impl JobStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns whether this status is absorbing.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl FromStr for JobStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(AppError::Validation(format!(
                "unknown job status '{value}'"
            ))),
        }
    }
}

/// Execution phase of one migration job; strictly forward-moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Not yet started.
    Pending,
    /// Migrating content type definitions.
    ContentTypes,
    /// Migrating media assets.
    Assets,
    /// Migrating entries.
    Entries,
    /// All phases finished.
    Done,
}

impl JobPhase {
    /// Returns a stable storage value for this phase.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ContentTypes => "content_types",
            Self::Assets => "assets",
            Self::Entries => "entries",
            Self::Done => "done",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::ContentTypes => 1,
            Self::Assets => 2,
            Self::Entries => 3,
            Self::Done => 4,
        }
    }
}

impl FromStr for JobPhase {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "content_types" => Ok(Self::ContentTypes),
            "assets" => Ok(Self::Assets),
            "entries" => Ok(Self::Entries),
            "done" => Ok(Self::Done),
            _ => Err(AppError::Validation(format!("unknown job phase '{value}'"))),
        }
    }
}

/// Item counters for one migration phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounters {
    /// Items discovered for the phase.
    pub total: u64,
    /// Items migrated successfully.
    pub completed: u64,
    /// Items already present at the destination.
    pub skipped: u64,
    /// Items that failed to migrate.
    pub failed: u64,
}

impl PhaseCounters {
    /// Creates counters for a known item total.
    #[must_use]
    pub fn with_total(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Counts one successfully migrated item.
    pub fn record_completed(&mut self) {
        self.completed = self.completed.saturating_add(1);
    }

    /// Counts one item skipped because it already exists.
    pub fn record_skipped(&mut self) {
        self.skipped = self.skipped.saturating_add(1);
    }

    /// Counts one failed item.
    pub fn record_failed(&mut self) {
        self.failed = self.failed.saturating_add(1);
    }

    /// Returns items that no longer need work.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.completed.saturating_add(self.skipped)
    }
}

/// Asset migration strategy selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStrategy {
    /// Migrate only assets referenced by selected entries.
    Linked,
    /// Migrate every asset in the source environment.
    All,
}

impl AssetStrategy {
    /// Returns a stable storage value for this strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linked => "linked",
            Self::All => "all",
        }
    }
}

impl FromStr for AssetStrategy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "linked" => Ok(Self::Linked),
            "all" => Ok(Self::All),
            _ => Err(AppError::Validation(format!(
                "unknown asset strategy '{value}'"
            ))),
        }
    }
}

/// Source CMS space credentials and scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpace {
    /// Source space identifier.
    pub space_id: String,
    /// Source environment name.
    pub environment: String,
    /// Management API token.
    pub cma_token: String,
    /// Delivery API token.
    pub cda_token: String,
}

/// Destination project/environment for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSpace {
    /// Destination project identifier.
    pub project_id: String,
    /// Destination environment identifier.
    pub environment_id: String,
    /// Destination tenant.
    pub tenant_id: TenantId,
}

/// User selections carried on each job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Content types to migrate in this job.
    pub content_type_ids: Vec<String>,
    /// Asset migration strategy.
    pub asset_strategy: AssetStrategy,
}

/// One non-fatal item failure recorded during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobItemError {
    /// Phase in which the item failed.
    pub phase: JobPhase,
    /// Source item identifier.
    pub item_id: String,
    /// Failure detail.
    pub error: String,
}

/// Phase pointer plus per-phase counters for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Current phase.
    pub phase: JobPhase,
    /// Content type counters.
    pub content_types: PhaseCounters,
    /// Asset counters.
    pub assets: PhaseCounters,
    /// Entry counters.
    pub entries: PhaseCounters,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            phase: JobPhase::Pending,
            content_types: PhaseCounters::default(),
            assets: PhaseCounters::default(),
            entries: PhaseCounters::default(),
        }
    }
}

impl JobProgress {
    /// Moves the phase pointer forward; regression is rejected.
    ///
    /// Re-entering the current phase is allowed so a re-delivered
    /// snapshot write cannot fail the invariant.
    pub fn enter_phase(&mut self, phase: JobPhase) -> AppResult<()> {
        if phase.rank() < self.phase.rank() {
            return Err(AppError::Conflict(format!(
                "job phase cannot move backwards from '{}' to '{}'",
                self.phase.as_str(),
                phase.as_str()
            )));
        }

        self.phase = phase;
        Ok(())
    }

    /// Returns the counters for an executable phase.
    #[must_use]
    pub fn counters_mut(&mut self, phase: JobPhase) -> Option<&mut PhaseCounters> {
        match phase {
            JobPhase::ContentTypes => Some(&mut self.content_types),
            JobPhase::Assets => Some(&mut self.assets),
            JobPhase::Entries => Some(&mut self.entries),
            JobPhase::Pending | JobPhase::Done => None,
        }
    }
}

/// One persisted migration job: a single source environment migrated
/// into one destination project/environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationJob {
    /// Stable job identifier.
    pub job_id: JobId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Source space and credentials.
    pub source: SourceSpace,
    /// Destination scope.
    pub destination: DestinationSpace,
    /// User selections.
    pub config: JobConfig,
    /// Source environment name kept for display.
    pub source_environment: String,
    /// Phase pointer and counters.
    pub progress: JobProgress,
    /// Non-fatal item failures.
    pub errors: Vec<JobItemError>,
    /// Optional status message from the worker.
    pub message: Option<String>,
    /// Creation timestamp; batches are grouped by proximity of this.
    pub created_at: DateTime<Utc>,
}

impl MigrationJob {
    /// Applies a status transition, enforcing the lifecycle graph.
    ///
    /// Terminal statuses are absorbing. `Completed` is only reachable
    /// from `Running` once the phase pointer has reached `Done`.
    pub fn transition(&mut self, status: JobStatus) -> AppResult<()> {
        if self.status == status {
            return Ok(());
        }

        if self.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "job '{}' is already '{}' and cannot become '{}'",
                self.job_id,
                self.status.as_str(),
                status.as_str()
            )));
        }

        let allowed = match (self.status, status) {
            (JobStatus::Pending, JobStatus::Running)
            | (JobStatus::Pending, JobStatus::Failed)
            | (JobStatus::Pending, JobStatus::Cancelled)
            | (JobStatus::Running, JobStatus::Failed)
            | (JobStatus::Running, JobStatus::Cancelled) => true,
            (JobStatus::Running, JobStatus::Completed) => self.progress.phase == JobPhase::Done,
            _ => false,
        };

        if !allowed {
            return Err(AppError::Conflict(format!(
                "job '{}' cannot transition from '{}' to '{}'",
                self.job_id,
                self.status.as_str(),
                status.as_str()
            )));
        }

        self.status = status;
        Ok(())
    }
}
