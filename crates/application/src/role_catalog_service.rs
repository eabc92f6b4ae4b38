use std::collections::HashMap;
use std::sync::Arc;

use opalcms_core::{AppError, AppResult, NonEmptyString, TenantId};
use opalcms_domain::{PermissionRule, Role, RoleKind};
use uuid::Uuid;

use crate::security_ports::{
    AuditAction, AuditEvent, AuditRepository, CreateRoleInput, RoleRepository, UpdateRoleInput,
};

/// Application service for the tenant role catalog.
///
/// Owns the system-role immutability guard and the duplicate
/// system-role repair; plain rule evaluation lives on the domain
/// `Role` itself.
#[derive(Clone)]
pub struct RoleCatalogService {
    repository: Arc<dyn RoleRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl RoleCatalogService {
    /// Creates a new role catalog service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RoleRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            repository,
            audit_repository,
        }
    }

    /// Lists tenant roles, repairing duplicate system roles first.
    ///
    /// Role provisioning is not transactional with tenant creation, so
    /// duplicate system roles can exist; the list path is where they
    /// get repaired.
    pub async fn list_roles(&self, tenant_id: TenantId) -> AppResult<Vec<Role>> {
        let removed = self.cleanup_duplicate_roles(tenant_id).await?;
        if removed > 0 {
            tracing::warn!(%tenant_id, removed, "removed duplicate system roles");
        }

        self.repository.list_roles(tenant_id).await
    }

    /// Creates a custom role and emits an audit event.
    pub async fn create_role(
        &self,
        tenant_id: TenantId,
        actor: &str,
        input: CreateRoleInput,
    ) -> AppResult<Role> {
        let name = NonEmptyString::new(input.name)?;
        if RoleKind::from_system_name(name.as_str()).is_some() {
            return Err(AppError::Validation(format!(
                "role name '{}' is reserved for system roles",
                name.as_str()
            )));
        }

        let rules = revalidated_rules(input.rules)?;
        let role = Role {
            role_id: Uuid::new_v4().to_string(),
            tenant_id,
            name,
            description: normalized_description(input.description),
            kind: RoleKind::Custom,
            rules,
        };

        self.repository.create_role(role.clone()).await?;

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id,
                subject: actor.to_owned(),
                action: AuditAction::RoleCreated,
                resource_type: "role".to_owned(),
                resource_id: role.role_id.clone(),
                detail: Some(format!("created role '{}'", role.name.as_str())),
            })
            .await?;

        Ok(role)
    }

    /// Updates a custom role; system roles are rejected before any write.
    pub async fn update_role(
        &self,
        tenant_id: TenantId,
        actor: &str,
        role_id: &str,
        input: UpdateRoleInput,
    ) -> AppResult<Role> {
        let mut role = self.require_custom_role(tenant_id, role_id).await?;

        if let Some(name) = input.name {
            let name = NonEmptyString::new(name)?;
            if RoleKind::from_system_name(name.as_str()).is_some() {
                return Err(AppError::Validation(format!(
                    "role name '{}' is reserved for system roles",
                    name.as_str()
                )));
            }
            role.name = name;
        }

        if let Some(description) = input.description {
            role.description = normalized_description(Some(description));
        }

        if let Some(rules) = input.rules {
            role.rules = revalidated_rules(rules)?;
        }

        self.repository.update_role(role.clone()).await?;

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id,
                subject: actor.to_owned(),
                action: AuditAction::RoleUpdated,
                resource_type: "role".to_owned(),
                resource_id: role.role_id.clone(),
                detail: Some(format!("updated role '{}'", role.name.as_str())),
            })
            .await?;

        Ok(role)
    }

    /// Deletes a custom role; system roles are rejected before any write.
    pub async fn delete_role(
        &self,
        tenant_id: TenantId,
        actor: &str,
        role_id: &str,
    ) -> AppResult<()> {
        let role = self.require_custom_role(tenant_id, role_id).await?;

        self.repository.delete_role(tenant_id, role_id).await?;

        self.audit_repository
            .append_event(AuditEvent {
                tenant_id,
                subject: actor.to_owned(),
                action: AuditAction::RoleDeleted,
                resource_type: "role".to_owned(),
                resource_id: role.role_id.clone(),
                detail: Some(format!("deleted role '{}'", role.name.as_str())),
            })
            .await
    }

    /// Removes extra copies of each system role, keeping one canonical
    /// copy per kind. Roles carry no creation timestamp, so the lowest
    /// role id stands in as the canonical copy; the choice only needs
    /// to be stable. Idempotent: a second run deletes nothing.
    pub async fn cleanup_duplicate_roles(&self, tenant_id: TenantId) -> AppResult<usize> {
        let roles = self.repository.list_roles(tenant_id).await?;

        let mut by_kind: HashMap<RoleKind, Vec<Role>> = HashMap::new();
        for role in roles {
            if role.kind.is_system() {
                by_kind.entry(role.kind).or_default().push(role);
            }
        }

        let mut removed = 0_usize;
        for (_, mut duplicates) in by_kind {
            if duplicates.len() < 2 {
                continue;
            }

            // Lowest role id is the canonical copy.
            duplicates.sort_by(|left, right| left.role_id.cmp(&right.role_id));
            for extra in duplicates.into_iter().skip(1) {
                self.repository
                    .delete_role(tenant_id, extra.role_id.as_str())
                    .await?;
                removed += 1;

                self.audit_repository
                    .append_event(AuditEvent {
                        tenant_id,
                        subject: "system".to_owned(),
                        action: AuditAction::DuplicateRoleRemoved,
                        resource_type: "role".to_owned(),
                        resource_id: extra.role_id.clone(),
                        detail: Some(format!(
                            "removed duplicate system role '{}'",
                            extra.name.as_str()
                        )),
                    })
                    .await?;
            }
        }

        Ok(removed)
    }

    async fn require_custom_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Role> {
        let role = self
            .repository
            .find_role(tenant_id, role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;

        if role.is_system() {
            return Err(AppError::Forbidden(format!(
                "system role '{}' is immutable",
                role.name.as_str()
            )));
        }

        Ok(role)
    }
}

fn revalidated_rules(rules: Vec<PermissionRule>) -> AppResult<Vec<PermissionRule>> {
    rules
        .into_iter()
        .filter(|rule| !rule.is_noop())
        .map(|rule| PermissionRule::new(rule.rule_id, rule.resource, rule.actions, rule.context))
        .collect()
}

fn normalized_description(description: Option<String>) -> Option<String> {
    description.and_then(|value| {
        let trimmed = value.trim().to_owned();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use opalcms_core::{AppError, AppResult, NonEmptyString, TenantId};
    use opalcms_domain::{ActionKind, PermissionRule, ResourceKind, Role, RoleKind, RuleContext};
    use tokio::sync::Mutex;

    use crate::security_ports::{
        AuditEvent, AuditRepository, CreateRoleInput, RoleRepository, UpdateRoleInput,
    };

    use super::RoleCatalogService;

    #[derive(Default)]
    struct FakeAuditRepository {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[async_trait]
    impl AuditRepository for FakeAuditRepository {
        async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
            self.events.lock().await.push(event);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRoleRepository {
        roles: Mutex<HashMap<String, Role>>,
        writes: Mutex<u32>,
    }

    impl FakeRoleRepository {
        async fn seed(&self, role: Role) {
            self.roles.lock().await.insert(role.role_id.clone(), role);
        }
    }

    #[async_trait]
    impl RoleRepository for FakeRoleRepository {
        async fn create_role(&self, role: Role) -> AppResult<()> {
            *self.writes.lock().await += 1;
            self.roles.lock().await.insert(role.role_id.clone(), role);
            Ok(())
        }

        async fn update_role(&self, role: Role) -> AppResult<()> {
            *self.writes.lock().await += 1;
            self.roles.lock().await.insert(role.role_id.clone(), role);
            Ok(())
        }

        async fn delete_role(&self, _tenant_id: TenantId, role_id: &str) -> AppResult<()> {
            *self.writes.lock().await += 1;
            self.roles.lock().await.remove(role_id);
            Ok(())
        }

        async fn find_role(
            &self,
            _tenant_id: TenantId,
            role_id: &str,
        ) -> AppResult<Option<Role>> {
            Ok(self.roles.lock().await.get(role_id).cloned())
        }

        async fn list_roles(&self, tenant_id: TenantId) -> AppResult<Vec<Role>> {
            let mut roles: Vec<Role> = self
                .roles
                .lock()
                .await
                .values()
                .filter(|role| role.tenant_id == tenant_id)
                .cloned()
                .collect();
            roles.sort_by(|left, right| left.role_id.cmp(&right.role_id));
            Ok(roles)
        }

        async fn find_role_for_subject(
            &self,
            _tenant_id: TenantId,
            _subject: &str,
        ) -> AppResult<Option<Role>> {
            Ok(None)
        }
    }

    fn system_role(tenant_id: TenantId, role_id: &str, kind: RoleKind) -> Role {
        Role {
            role_id: role_id.to_owned(),
            tenant_id,
            name: NonEmptyString::new(kind.system_name().unwrap_or("owner"))
                .unwrap_or_else(|_| unreachable!()),
            description: None,
            kind,
            rules: Vec::new(),
        }
    }

    fn service(repository: Arc<FakeRoleRepository>) -> RoleCatalogService {
        RoleCatalogService::new(repository, Arc::new(FakeAuditRepository::default()))
    }

    #[tokio::test]
    async fn create_role_rejects_reserved_system_names() {
        let service = service(Arc::new(FakeRoleRepository::default()));

        let result = service
            .create_role(
                TenantId::new(),
                "alice",
                CreateRoleInput {
                    name: "admin".to_owned(),
                    description: None,
                    rules: Vec::new(),
                },
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_role_drops_noop_rules() {
        let repository = Arc::new(FakeRoleRepository::default());
        let service = service(repository.clone());
        let tenant_id = TenantId::new();

        let role = service
            .create_role(
                tenant_id,
                "alice",
                CreateRoleInput {
                    name: "Editors".to_owned(),
                    description: Some("  ".to_owned()),
                    rules: vec![
                        PermissionRule {
                            rule_id: "r1".to_owned(),
                            resource: ResourceKind::Entry,
                            scope: None,
                            actions: vec![ActionKind::Read],
                            context: RuleContext::default(),
                        },
                        PermissionRule {
                            rule_id: "r2".to_owned(),
                            resource: ResourceKind::Asset,
                            scope: None,
                            actions: Vec::new(),
                            context: RuleContext::default(),
                        },
                    ],
                },
            )
            .await;

        let role = role.unwrap_or_else(|_| unreachable!());
        assert_eq!(role.rules.len(), 1);
        assert!(role.description.is_none());
    }

    #[tokio::test]
    async fn update_and_delete_reject_system_roles_before_any_write() {
        let repository = Arc::new(FakeRoleRepository::default());
        let tenant_id = TenantId::new();
        repository
            .seed(system_role(tenant_id, "role-owner", RoleKind::SystemOwner))
            .await;
        let service = service(repository.clone());

        let update = service
            .update_role(
                tenant_id,
                "the-owner",
                "role-owner",
                UpdateRoleInput::default(),
            )
            .await;
        assert!(matches!(update, Err(AppError::Forbidden(_))));

        let delete = service.delete_role(tenant_id, "the-owner", "role-owner").await;
        assert!(matches!(delete, Err(AppError::Forbidden(_))));

        assert_eq!(*repository.writes.lock().await, 0);
    }

    #[tokio::test]
    async fn cleanup_removes_extra_system_roles_and_is_idempotent() {
        let repository = Arc::new(FakeRoleRepository::default());
        let tenant_id = TenantId::new();
        repository
            .seed(system_role(tenant_id, "role-a", RoleKind::SystemAdmin))
            .await;
        repository
            .seed(system_role(tenant_id, "role-b", RoleKind::SystemAdmin))
            .await;
        repository
            .seed(system_role(tenant_id, "role-c", RoleKind::SystemMember))
            .await;
        let service = service(repository.clone());

        let removed = service.cleanup_duplicate_roles(tenant_id).await;
        assert_eq!(removed.unwrap_or(0), 1);

        let roles = repository.list_roles(tenant_id).await.unwrap_or_default();
        assert_eq!(roles.len(), 2);
        // Canonical copy is the lowest role id.
        assert!(roles.iter().any(|role| role.role_id == "role-a"));

        let removed_again = service.cleanup_duplicate_roles(tenant_id).await;
        assert_eq!(removed_again.unwrap_or(99), 0);
    }
}
