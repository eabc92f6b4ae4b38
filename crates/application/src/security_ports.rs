use async_trait::async_trait;
use opalcms_core::{AppResult, TenantId};
use opalcms_domain::{PermissionRule, Role};

/// Stable audit actions emitted by application use-cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    /// Emitted when a custom role is created.
    RoleCreated,
    /// Emitted when a custom role is updated.
    RoleUpdated,
    /// Emitted when a custom role is deleted.
    RoleDeleted,
    /// Emitted when a duplicate system role is repaired away.
    DuplicateRoleRemoved,
    /// Emitted when a migration batch is created.
    MigrationBatchCreated,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleCreated => "security.role.created",
            Self::RoleUpdated => "security.role.updated",
            Self::RoleDeleted => "security.role.deleted",
            Self::DuplicateRoleRemoved => "security.role.duplicate_removed",
            Self::MigrationBatchCreated => "migration.batch.created",
        }
    }
}

/// One audit log event row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Acting subject identifier.
    pub subject: String,
    /// Stable action value.
    pub action: AuditAction,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Optional human-readable detail.
    pub detail: Option<String>,
}

/// Append-only audit log port.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends one audit event.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;
}

/// Input payload for creating a custom role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Unique role name in tenant scope.
    pub name: String,
    /// Optional role description.
    pub description: Option<String>,
    /// Allow rules to attach to the role.
    pub rules: Vec<PermissionRule>,
}

/// Partial update payload for a custom role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRoleInput {
    /// New role name, when changing.
    pub name: Option<String>,
    /// New description, when changing.
    pub description: Option<String>,
    /// Replacement rule list, when changing.
    pub rules: Option<Vec<PermissionRule>>,
}

/// Repository port for role persistence.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Persists a new role.
    async fn create_role(&self, role: Role) -> AppResult<()>;

    /// Replaces a stored role.
    async fn update_role(&self, role: Role) -> AppResult<()>;

    /// Deletes a stored role.
    async fn delete_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<()>;

    /// Returns one role by id.
    async fn find_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<Role>>;

    /// Lists tenant roles in stable (role id) order.
    async fn list_roles(&self, tenant_id: TenantId) -> AppResult<Vec<Role>>;

    /// Resolves the effective role for a subject via membership.
    ///
    /// `None` means membership is not yet provisioned or still
    /// loading, which callers must treat as unresolved, not denied.
    async fn find_role_for_subject(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<Role>>;
}
