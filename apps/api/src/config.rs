use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use opalcms_core::{AppError, TenantId};
use tracing_subscriber::EnvFilter;

/// Runtime configuration for the API service.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_host: String,
    pub api_port: u16,
    pub frontend_url: String,
    pub admin_token: String,
    pub worker_base_url: String,
    pub worker_shared_secret: String,
    pub source_cda_base_url: Option<String>,
    pub resume_tenant_id: Option<TenantId>,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());
        let admin_token = required_env("ADMIN_API_TOKEN")?;
        let worker_base_url = env::var("WORKER_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3002".to_owned())
            .trim_end_matches('/')
            .to_owned();
        let worker_shared_secret = required_env("WORKER_SHARED_SECRET")?;
        let source_cda_base_url = env::var("SOURCE_CDA_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let resume_tenant_id = env::var("RESUME_TENANT_ID")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                uuid::Uuid::parse_str(value.as_str())
                    .map(TenantId::from_uuid)
                    .map_err(|error| {
                        AppError::Validation(format!("invalid RESUME_TENANT_ID: {error}"))
                    })
            })
            .transpose()?;

        Ok(Self {
            api_host,
            api_port,
            frontend_url,
            admin_token,
            worker_base_url,
            worker_shared_secret,
            source_cda_base_url,
            resume_tenant_id,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
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
