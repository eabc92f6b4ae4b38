use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderMap, StatusCode};
use opalcms_application::{AccessDecision, CreateRoleInput, UpdateRoleInput};
use opalcms_core::{AppError, TenantId};
use opalcms_domain::rule_state::rules_from_state;
use uuid::Uuid;

use crate::dto::{
    AccessCheckRequest, AccessCheckResponse, CleanupResponse, CreateRoleRequest, RoleResponse,
    UpdateRoleRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::Actor;
use crate::state::AppState;

pub async fn list_roles_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Vec<RoleResponse>>> {
    let roles = state
        .role_catalog_service
        .list_roles(TenantId::from_uuid(tenant_id))
        .await?
        .into_iter()
        .map(RoleResponse::from)
        .collect();

    Ok(Json(roles))
}

pub async fn create_role_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleResponse>)> {
    let rules = payload
        .state
        .as_ref()
        .map(rules_from_state)
        .unwrap_or_default();

    let role = state
        .role_catalog_service
        .create_role(
            TenantId::from_uuid(tenant_id),
            actor.0.as_str(),
            CreateRoleInput {
                name: payload.name,
                description: payload.description,
                rules,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

pub async fn update_role_handler(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
    Extension(actor): Extension<Actor>,
    headers: HeaderMap,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let tenant_id = tenant_from_headers(&headers)?;

    let role = state
        .role_catalog_service
        .update_role(
            tenant_id,
            actor.0.as_str(),
            role_id.as_str(),
            UpdateRoleInput {
                name: payload.name,
                description: payload.description,
                rules: payload.state.as_ref().map(rules_from_state),
            },
        )
        .await?;

    Ok(Json(RoleResponse::from(role)))
}

pub async fn delete_role_handler(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
    Extension(actor): Extension<Actor>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let tenant_id = tenant_from_headers(&headers)?;

    state
        .role_catalog_service
        .delete_role(tenant_id, actor.0.as_str(), role_id.as_str())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn cleanup_roles_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<CleanupResponse>> {
    let removed = state
        .role_catalog_service
        .cleanup_duplicate_roles(TenantId::from_uuid(tenant_id))
        .await?;

    Ok(Json(CleanupResponse { removed }))
}

pub async fn check_access_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(payload): Json<AccessCheckRequest>,
) -> ApiResult<Json<AccessCheckResponse>> {
    let (subject, query) = payload.into_query();

    let decision = state
        .access_service
        .check(TenantId::from_uuid(tenant_id), subject.as_str(), &query)
        .await?;

    Ok(Json(AccessCheckResponse {
        granted: decision.is_granted(),
        decision: match decision {
            AccessDecision::Granted => "granted",
            AccessDecision::Denied => "denied",
            AccessDecision::Unresolved => "unresolved",
        },
    }))
}

/// Reads the tenant scope from the `x-opal-tenant` header on routes
/// addressed by role id alone.
fn tenant_from_headers(headers: &HeaderMap) -> Result<TenantId, ApiError> {
    let value = headers
        .get("x-opal-tenant")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Validation("x-opal-tenant header is required".to_owned()))?;

    let tenant_id = Uuid::parse_str(value)
        .map_err(|error| AppError::Validation(format!("invalid x-opal-tenant header: {error}")))?;
    Ok(TenantId::from_uuid(tenant_id))
}
