use opalcms_application::phase_percent;
use opalcms_core::TenantId;
use opalcms_domain::{
    AccessQuery, ActionKind, AssetStrategy, DestinationSpace, JobItemError, MigrationJob,
    PhaseCounters, ResourceKind, Role, RuleContext, RuleState, SourceSpace,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Role payload with the grouped rule-editor state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub role_id: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: String,
    pub state: RuleState,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        let state = opalcms_domain::rule_state::parse_rules(&role.rules);
        Self {
            role_id: role.role_id,
            name: role.name.as_str().to_owned(),
            description: role.description,
            kind: role.kind.system_name().unwrap_or("custom").to_owned(),
            state,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
    pub state: Option<RuleState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub state: Option<RuleState>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub removed: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheckRequest {
    pub subject: String,
    pub resource: ResourceKind,
    pub action: ActionKind,
    #[serde(default)]
    pub context: RuleContext,
}

impl AccessCheckRequest {
    pub fn into_query(self) -> (String, AccessQuery) {
        (
            self.subject,
            AccessQuery {
                resource: self.resource,
                action: self.action,
                context: self.context,
            },
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheckResponse {
    pub decision: &'static str,
    pub granted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMigrationRequest {
    pub source: SourceSpaceRequest,
    pub destination: DestinationRequest,
    pub config: MigrationConfigRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpaceRequest {
    pub space_id: String,
    pub environment: String,
    pub cma_token: String,
    pub cda_token: String,
}

impl From<SourceSpaceRequest> for SourceSpace {
    fn from(value: SourceSpaceRequest) -> Self {
        Self {
            space_id: value.space_id,
            environment: value.environment,
            cma_token: value.cma_token,
            cda_token: value.cda_token,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRequest {
    pub project_id: String,
    pub environment_id: String,
    pub tenant_id: Uuid,
}

impl From<DestinationRequest> for DestinationSpace {
    fn from(value: DestinationRequest) -> Self {
        Self {
            project_id: value.project_id,
            environment_id: value.environment_id,
            tenant_id: TenantId::from_uuid(value.tenant_id),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfigRequest {
    pub content_type_ids: Vec<String>,
    pub asset_strategy: AssetStrategy,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMigrationResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCountersResponse {
    pub total: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub percent: u8,
}

impl From<&PhaseCounters> for PhaseCountersResponse {
    fn from(counters: &PhaseCounters) -> Self {
        Self {
            total: counters.total,
            completed: counters.completed,
            skipped: counters.skipped,
            failed: counters.failed,
            percent: phase_percent(counters),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobItemErrorResponse {
    pub phase: String,
    pub item_id: String,
    pub error: String,
}

impl From<&JobItemError> for JobItemErrorResponse {
    fn from(value: &JobItemError) -> Self {
        Self {
            phase: value.phase.as_str().to_owned(),
            item_id: value.item_id.clone(),
            error: value.error.clone(),
        }
    }
}

/// Job payload returned by the migration endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: String,
    pub status: String,
    pub phase: String,
    pub source_environment: String,
    pub content_types: PhaseCountersResponse,
    pub assets: PhaseCountersResponse,
    pub entries: PhaseCountersResponse,
    pub errors: Vec<JobItemErrorResponse>,
    pub message: Option<String>,
    pub created_at: String,
}

impl From<MigrationJob> for JobResponse {
    fn from(job: MigrationJob) -> Self {
        Self {
            job_id: job.job_id.to_string(),
            status: job.status.as_str().to_owned(),
            phase: job.progress.phase.as_str().to_owned(),
            source_environment: job.source_environment,
            content_types: PhaseCountersResponse::from(&job.progress.content_types),
            assets: PhaseCountersResponse::from(&job.progress.assets),
            entries: PhaseCountersResponse::from(&job.progress.entries),
            errors: job.errors.iter().map(JobItemErrorResponse::from).collect(),
            message: job.message,
            created_at: job.created_at.to_rfc3339(),
        }
    }
}
