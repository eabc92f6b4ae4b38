//! Opal CMS admin API composition root.

#![forbid(unsafe_code)]

mod config;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, patch, post, put};
use opalcms_application::{AccessService, JobFactory, MigrationSequencer, RoleCatalogService};
use opalcms_core::AppError;
use opalcms_infrastructure::{
    CdaSourceReader, HttpWorkerTrigger, InMemoryAuditRepository, InMemoryJobRepository,
    InMemoryRoleRepository,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    config::init_tracing();

    let config = ApiConfig::load()?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build http client: {error}")))?;

    let role_repository = Arc::new(InMemoryRoleRepository::new());
    let audit_repository = Arc::new(InMemoryAuditRepository::new());
    let job_repository = Arc::new(InMemoryJobRepository::new());
    let worker_trigger = Arc::new(HttpWorkerTrigger::new(
        http_client.clone(),
        config.worker_base_url.clone(),
        config.worker_shared_secret.clone(),
    ));
    let source_reader = Arc::new(match config.source_cda_base_url.clone() {
        Some(base_url) => CdaSourceReader::with_base_url(http_client, base_url),
        None => CdaSourceReader::new(http_client),
    });

    let role_catalog_service =
        RoleCatalogService::new(role_repository.clone(), audit_repository.clone());
    let access_service = AccessService::new(role_repository);
    let job_factory = JobFactory::new(job_repository.clone(), audit_repository);
    let sequencer = Arc::new(MigrationSequencer::new(
        job_repository.clone(),
        worker_trigger,
    ));

    // Reconstructs an interrupted batch from the store after a restart.
    if let Some(tenant_id) = config.resume_tenant_id {
        match sequencer.resume(tenant_id).await? {
            Some(jobs) => {
                sequencer.subscribe_all().await?;
                info!(jobs = jobs.len(), "resumed in-flight migration batch");
            }
            None => info!("no in-flight migration batch to resume"),
        }
    }

    let app_state = AppState {
        role_catalog_service,
        access_service,
        job_factory,
        sequencer,
        job_repository,
        source_reader,
        admin_token: config.admin_token.clone(),
        worker_shared_secret: config.worker_shared_secret.clone(),
        frontend_url: config.frontend_url.clone(),
    };

    let admin_routes = Router::new()
        .route(
            "/v1/tenants/{tenant_id}/roles",
            get(handlers::security::list_roles_handler).post(handlers::security::create_role_handler),
        )
        .route(
            "/v1/roles/{role_id}",
            patch(handlers::security::update_role_handler)
                .delete(handlers::security::delete_role_handler),
        )
        .route(
            "/v1/tenants/{tenant_id}/roles/cleanup",
            post(handlers::security::cleanup_roles_handler),
        )
        .route(
            "/v1/tenants/{tenant_id}/access/check",
            post(handlers::security::check_access_handler),
        )
        .route(
            "/v1/migration/start",
            post(handlers::migration::start_migration_handler),
        )
        .route(
            "/v1/migration/batch/summary",
            get(handlers::migration::batch_summary_handler),
        )
        .route(
            "/v1/migration/jobs/{job_id}",
            get(handlers::migration::get_job_handler),
        )
        .route(
            "/v1/migration/jobs/{job_id}/cancel",
            post(handlers::migration::cancel_job_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_admin,
        ));

    // Worker-facing job endpoints behind the shared worker secret.
    let internal_routes = Router::new()
        .route(
            "/internal/jobs/{job_id}",
            get(handlers::internal::get_job_handler),
        )
        .route(
            "/internal/jobs/{job_id}/progress",
            put(handlers::internal::save_progress_handler),
        )
        .route(
            "/internal/jobs/{job_id}/status",
            put(handlers::internal::set_status_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_worker_secret,
        ));

    let cors_layer = CorsLayer::new()
        .allow_origin(
            HeaderValue::from_str(&config.frontend_url)
                .map_err(|error| AppError::Internal(format!("invalid FRONTEND_URL: {error}")))?,
        )
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    let app = Router::new()
        .route("/healthz", get(handlers::health::health_handler))
        .merge(admin_routes)
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(app_state);

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "opalcms-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}
