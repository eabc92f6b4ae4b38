//! Opal CMS migration worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use opalcms_application::JobRunner;
use opalcms_core::{AppError, JobId};
use opalcms_infrastructure::{CdaSourceReader, HttpDestinationWriter, HttpJobStore};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    worker_host: String,
    worker_port: u16,
    shared_secret: String,
    api_base_url: String,
    destination_api_base_url: String,
    destination_api_token: String,
    source_cda_base_url: Option<String>,
}

impl WorkerConfig {
    fn load() -> Result<Self, AppError> {
        let worker_host = env::var("WORKER_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let worker_port = env::var("WORKER_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3002);

        let shared_secret = required_env("WORKER_SHARED_SECRET")?;
        let api_base_url = env::var("API_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3001".to_owned())
            .trim_end_matches('/')
            .to_owned();
        let destination_api_base_url = required_env("DESTINATION_API_BASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        let destination_api_token = required_env("DESTINATION_API_TOKEN")?;
        let source_cda_base_url = env::var("SOURCE_CDA_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());

        Ok(Self {
            worker_host,
            worker_port,
            shared_secret,
            api_base_url,
            destination_api_base_url,
            destination_api_token,
            source_cda_base_url,
        })
    }

    fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.worker_host).map_err(|error| {
            AppError::Internal(format!(
                "invalid WORKER_HOST '{}': {error}",
                self.worker_host
            ))
        })?;
        Ok(SocketAddr::from((host, self.worker_port)))
    }
}

#[derive(Clone)]
struct WorkerState {
    runner: Arc<JobRunner>,
    shared_secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunJobRequest {
    job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunJobResponse {
    job_id: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build http client: {error}")))?;

    let job_store = Arc::new(HttpJobStore::new(
        http_client.clone(),
        config.api_base_url.clone(),
        config.shared_secret.clone(),
    ));
    let source_reader = Arc::new(match config.source_cda_base_url.clone() {
        Some(base_url) => CdaSourceReader::with_base_url(http_client.clone(), base_url),
        None => CdaSourceReader::new(http_client.clone()),
    });
    let destination_writer = Arc::new(HttpDestinationWriter::new(
        http_client,
        config.destination_api_base_url.clone(),
        config.destination_api_token.clone(),
    ));
    let runner = Arc::new(JobRunner::new(job_store, source_reader, destination_writer));

    let state = WorkerState {
        runner,
        shared_secret: config.shared_secret.clone(),
    };

    let app = Router::new()
        .route("/v1/jobs/run", post(run_job_handler))
        .route_layer(from_fn_with_state(state.clone(), require_shared_secret))
        .route("/healthz", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, api_base_url = %config.api_base_url, "opalcms-worker listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("worker server error: {error}")))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Accepts a job run request and executes it in the background; the
/// API observes the outcome through the job's stored status.
async fn run_job_handler(
    State(state): State<WorkerState>,
    Json(payload): Json<RunJobRequest>,
) -> Result<(StatusCode, Json<RunJobResponse>), Response> {
    let job_id = JobId::parse(payload.job_id.as_str())
        .map_err(|error| (StatusCode::BAD_REQUEST, error.to_string()).into_response())?;

    let runner = state.runner.clone();
    let spawned_job_id = job_id.clone();
    tokio::spawn(async move {
        if let Err(run_error) = runner.run(&spawned_job_id).await {
            error!(job_id = %spawned_job_id, error = %run_error, "migration job run failed");
        } else {
            info!(job_id = %spawned_job_id, "migration job run finished");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunJobResponse {
            job_id: job_id.to_string(),
        }),
    ))
}

async fn require_shared_secret(
    State(state): State<WorkerState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if token == state.shared_secret => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}
