use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use opalcms_core::AppError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Acting subject carried through admin requests.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

/// Guards admin routes with the configured bearer token and attaches
/// the acting subject from the `x-opal-subject` header.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    require_bearer(&request, state.admin_token.as_str())?;

    let subject = request
        .headers()
        .get("x-opal-subject")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("admin")
        .to_owned();
    request.extensions_mut().insert(Actor(subject));

    Ok(next.run(request).await)
}

/// Guards internal worker routes with the shared worker secret.
pub async fn require_worker_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    require_bearer(&request, state.worker_shared_secret.as_str())?;
    Ok(next.run(request).await)
}

fn require_bearer(request: &Request, expected: &str) -> Result<(), ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if token == expected => Ok(()),
        _ => Err(AppError::Unauthorized("authentication required".to_owned()).into()),
    }
}
