use std::collections::{HashMap, HashSet};

use opalcms_core::JobId;
use opalcms_domain::{JobStatus, MigrationJob};

/// Side effect requested by the sequencer reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerEffect {
    /// Ask the worker to pick up this job.
    TriggerWorker(JobId),
}

/// Pure state machine chaining the jobs of one migration batch.
///
/// Jobs run one at a time in creation order. The reducer consumes job
/// snapshots and emits trigger effects; it never performs I/O itself,
/// so duplicate and reordered snapshot deliveries can be reasoned
/// about in isolation. The `triggered` set guarantees each job is
/// handed to the worker at most once regardless of how many snapshots
/// report its predecessor complete.
#[derive(Debug)]
pub struct BatchSequencer {
    order: Vec<JobId>,
    jobs: HashMap<JobId, MigrationJob>,
    triggered: HashSet<JobId>,
    chaining_stopped: bool,
}

impl BatchSequencer {
    /// Starts sequencing a freshly created batch, triggering only the
    /// first job.
    #[must_use]
    pub fn start(jobs: Vec<MigrationJob>) -> (Self, Vec<SequencerEffect>) {
        let order: Vec<JobId> = jobs.iter().map(|job| job.job_id.clone()).collect();
        let mut sequencer = Self {
            order,
            jobs: jobs
                .into_iter()
                .map(|job| (job.job_id.clone(), job))
                .collect(),
            triggered: HashSet::new(),
            chaining_stopped: false,
        };

        let mut effects = Vec::new();
        if let Some(first) = sequencer.order.first().cloned() {
            sequencer.triggered.insert(first.clone());
            effects.push(SequencerEffect::TriggerWorker(first));
        }

        (sequencer, effects)
    }

    /// Rebuilds sequencing state for a batch found in storage after a
    /// restart.
    ///
    /// Jobs are reordered by creation time. Every job that already
    /// left `Pending` is marked triggered. If nothing is running and
    /// the first pending job directly follows the completed prefix,
    /// the previous process died between completing one job and
    /// triggering the next, so that pending job is triggered now.
    #[must_use]
    pub fn resume(mut jobs: Vec<MigrationJob>) -> (Self, Vec<SequencerEffect>) {
        jobs.sort_by_key(|job| job.created_at);

        let order: Vec<JobId> = jobs.iter().map(|job| job.job_id.clone()).collect();
        let triggered: HashSet<JobId> = jobs
            .iter()
            .filter(|job| job.status != JobStatus::Pending)
            .map(|job| job.job_id.clone())
            .collect();
        let any_running = jobs.iter().any(|job| job.status == JobStatus::Running);
        let stalled = if any_running {
            None
        } else {
            // A pending job is only re-triggered when the chain would
            // have reached it: at the batch head (died before the
            // first trigger) or directly after a completed job (died
            // between completion and trigger). A failed or cancelled
            // predecessor never advances the chain.
            jobs.iter()
                .position(|job| !job.status.is_terminal())
                .and_then(|index| {
                    let job = jobs.get(index)?;
                    if job.status != JobStatus::Pending {
                        return None;
                    }
                    let chain_reached = index == 0
                        || jobs
                            .get(index - 1)
                            .is_some_and(|previous| previous.status == JobStatus::Completed);
                    chain_reached.then(|| job.job_id.clone())
                })
        };

        let mut sequencer = Self {
            order,
            jobs: jobs
                .into_iter()
                .map(|job| (job.job_id.clone(), job))
                .collect(),
            triggered,
            chaining_stopped: false,
        };

        let mut effects = Vec::new();
        if let Some(job_id) = stalled {
            if sequencer.triggered.insert(job_id.clone()) {
                effects.push(SequencerEffect::TriggerWorker(job_id));
            }
        }

        (sequencer, effects)
    }

    /// Applies one job snapshot; last write wins.
    ///
    /// When a snapshot reports a job `Completed`, the next untriggered
    /// non-terminal job in order is triggered exactly once.
    pub fn observe(&mut self, snapshot: MigrationJob) -> Vec<SequencerEffect> {
        let job_id = snapshot.job_id.clone();
        if !self.order.contains(&job_id) {
            return Vec::new();
        }
        if snapshot.status != JobStatus::Pending {
            self.triggered.insert(job_id.clone());
        }

        let completed = snapshot.status == JobStatus::Completed;
        self.jobs.insert(job_id.clone(), snapshot);

        if !completed || self.chaining_stopped {
            return Vec::new();
        }

        let Some(next) = self.next_after(&job_id) else {
            return Vec::new();
        };
        if self.triggered.insert(next.clone()) {
            vec![SequencerEffect::TriggerWorker(next)]
        } else {
            Vec::new()
        }
    }

    /// Returns the jobs still worth cancelling and stops any further
    /// chaining.
    pub fn cancel_targets(&mut self) -> Vec<JobId> {
        self.chaining_stopped = true;
        self.order
            .iter()
            .filter(|job_id| {
                self.jobs
                    .get(*job_id)
                    .is_some_and(|job| !job.status.is_terminal())
            })
            .cloned()
            .collect()
    }

    /// Returns whether every job in the batch completed. Cancelled
    /// and failed jobs do not count.
    #[must_use]
    pub fn is_all_complete(&self) -> bool {
        self.order.iter().all(|job_id| {
            self.jobs
                .get(job_id)
                .is_some_and(|job| job.status == JobStatus::Completed)
        })
    }

    /// Returns the tracked jobs in batch order.
    #[must_use]
    pub fn jobs_in_order(&self) -> Vec<&MigrationJob> {
        self.order
            .iter()
            .filter_map(|job_id| self.jobs.get(job_id))
            .collect()
    }

    fn next_after(&self, job_id: &JobId) -> Option<JobId> {
        let index = self.order.iter().position(|candidate| candidate == job_id)?;
        self.order
            .iter()
            .skip(index + 1)
            .find(|candidate| {
                self.jobs
                    .get(*candidate)
                    .is_none_or(|job| !job.status.is_terminal())
            })
            .cloned()
    }
}
