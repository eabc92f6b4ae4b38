//! Domain model for the Opal CMS admin core: permission rules and
//! matching, the UI rule-state transform, and the migration job model.

#![forbid(unsafe_code)]

/// Migration job records, phases and counters.
pub mod migration;
/// UI-facing grouped rule state and the flat-rule transform.
pub mod rule_state;
/// Permission rules, roles and the matching algorithm.
pub mod security;

pub use migration::{
    AssetStrategy, DestinationSpace, JobConfig, JobItemError, JobPhase, JobProgress, JobStatus,
    MigrationJob, PhaseCounters, SourceSpace,
};
pub use rule_state::{ActionSelection, AssetRuleRow, ContentRuleRow, RuleState};
pub use security::{AccessQuery, ActionKind, PermissionRule, ResourceKind, Role, RoleKind, RuleContext};
