//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod cda_source_reader;
mod http_destination_writer;
mod http_job_store;
mod http_worker_trigger;
mod in_memory_audit_repository;
mod in_memory_job_repository;
mod in_memory_role_repository;

pub use cda_source_reader::CdaSourceReader;
pub use http_destination_writer::HttpDestinationWriter;
pub use http_job_store::HttpJobStore;
pub use http_worker_trigger::HttpWorkerTrigger;
pub use in_memory_audit_repository::InMemoryAuditRepository;
pub use in_memory_job_repository::InMemoryJobRepository;
pub use in_memory_role_repository::InMemoryRoleRepository;
