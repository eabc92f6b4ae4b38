use opalcms_domain::{JobProgress, PhaseCounters};
use serde::Serialize;

/// Returns the completion percentage for one phase.
///
/// Skipped items count as done; failed items do not. Rounds half up
/// and reports 0 for a phase with no discovered items.
#[must_use]
pub fn phase_percent(counters: &PhaseCounters) -> u8 {
    if counters.total == 0 {
        return 0;
    }

    let percent = (counters.processed().saturating_mul(100) + counters.total / 2) / counters.total;
    u8::try_from(percent.min(100)).unwrap_or(100)
}

/// Aggregated counters across every job of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Whether every phase of every job has been processed.
    pub all_complete: bool,
    /// Summed content type counters.
    pub content_types: PhaseCounters,
    /// Summed asset counters.
    pub assets: PhaseCounters,
    /// Summed entry counters.
    pub entries: PhaseCounters,
}

impl BatchSummary {
    /// Sums the per-phase counters of every job in a batch.
    #[must_use]
    pub fn from_jobs<'a>(jobs: impl Iterator<Item = &'a JobProgress>) -> Self {
        let mut summary = Self::default();
        let mut any = false;
        let mut all_done = true;

        for progress in jobs {
            any = true;
            all_done &= progress.phase == opalcms_domain::JobPhase::Done;
            accumulate(&mut summary.content_types, &progress.content_types);
            accumulate(&mut summary.assets, &progress.assets);
            accumulate(&mut summary.entries, &progress.entries);
        }

        summary.all_complete = any && all_done;
        summary
    }
}

fn accumulate(into: &mut PhaseCounters, from: &PhaseCounters) {
    into.total = into.total.saturating_add(from.total);
    into.completed = into.completed.saturating_add(from.completed);
    into.skipped = into.skipped.saturating_add(from.skipped);
    into.failed = into.failed.saturating_add(from.failed);
}
