use std::sync::Arc;

use opalcms_application::{
    AccessService, JobFactory, JobRepository, MigrationSequencer, RoleCatalogService, SourceReader,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub role_catalog_service: RoleCatalogService,
    pub access_service: AccessService,
    pub job_factory: JobFactory,
    pub sequencer: Arc<MigrationSequencer>,
    pub job_repository: Arc<dyn JobRepository>,
    pub source_reader: Arc<dyn SourceReader>,
    pub admin_token: String,
    pub worker_shared_secret: String,
    pub frontend_url: String,
}
