//! Application services and ports for the Opal CMS admin core.

#![forbid(unsafe_code)]

mod access_service;
mod batch_sequencer;
mod job_factory;
mod job_runner;
mod migration_ports;
mod migration_sequencer;
/// Batch progress aggregation helpers.
pub mod progress;
mod role_catalog_service;
mod security_ports;

pub use access_service::{AccessDecision, AccessService};
pub use batch_sequencer::{BatchSequencer, SequencerEffect};
pub use job_factory::JobFactory;
pub use job_runner::{JobRunner, linked_asset_ids};
pub use migration_ports::{
    ImportOutcome, JobRepository, JobStore, JobWatch, MigrationRequest, NewJobInput, RemoteItem,
    SourceReader, DestinationWriter, WorkerTrigger,
};
pub use migration_sequencer::{BATCH_WINDOW_SECONDS, MigrationSequencer, RESUME_SCAN_LIMIT};
pub use progress::{BatchSummary, phase_percent};
pub use role_catalog_service::RoleCatalogService;
pub use security_ports::{
    AuditAction, AuditEvent, AuditRepository, CreateRoleInput, RoleRepository, UpdateRoleInput,
};
