use std::collections::HashMap;

use async_trait::async_trait;
use opalcms_application::RoleRepository;
use opalcms_core::{AppError, AppResult, TenantId};
use opalcms_domain::Role;
use tokio::sync::RwLock;

/// In-memory role repository implementation.
#[derive(Debug, Default)]
pub struct InMemoryRoleRepository {
    roles: RwLock<HashMap<(TenantId, String), Role>>,
    memberships: RwLock<HashMap<(TenantId, String), String>>,
}

impl InMemoryRoleRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(HashMap::new()),
            memberships: RwLock::new(HashMap::new()),
        }
    }

    /// Assigns a subject to one of the tenant's roles.
    pub async fn assign_subject(
        &self,
        tenant_id: TenantId,
        subject: &str,
        role_id: &str,
    ) -> AppResult<()> {
        let roles = self.roles.read().await;
        if !roles.contains_key(&(tenant_id, role_id.to_owned())) {
            return Err(AppError::NotFound(format!(
                "role '{role_id}' does not exist"
            )));
        }
        drop(roles);

        self.memberships
            .write()
            .await
            .insert((tenant_id, subject.to_owned()), role_id.to_owned());
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn create_role(&self, role: Role) -> AppResult<()> {
        let key = (role.tenant_id, role.role_id.clone());
        let mut roles = self.roles.write().await;

        if roles.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists for tenant '{}'",
                key.1, key.0
            )));
        }

        roles.insert(key, role);
        Ok(())
    }

    async fn update_role(&self, role: Role) -> AppResult<()> {
        let key = (role.tenant_id, role.role_id.clone());
        let mut roles = self.roles.write().await;

        if !roles.contains_key(&key) {
            return Err(AppError::NotFound(format!(
                "role '{}' does not exist",
                key.1
            )));
        }

        roles.insert(key, role);
        Ok(())
    }

    async fn delete_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<()> {
        let mut roles = self.roles.write().await;
        if roles.remove(&(tenant_id, role_id.to_owned())).is_none() {
            return Err(AppError::NotFound(format!(
                "role '{role_id}' does not exist"
            )));
        }

        let mut memberships = self.memberships.write().await;
        memberships.retain(|_, assigned| assigned != role_id);
        Ok(())
    }

    async fn find_role(&self, tenant_id: TenantId, role_id: &str) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .get(&(tenant_id, role_id.to_owned()))
            .cloned())
    }

    async fn list_roles(&self, tenant_id: TenantId) -> AppResult<Vec<Role>> {
        let roles = self.roles.read().await;

        let mut values: Vec<Role> = roles
            .iter()
            .filter_map(|((stored_tenant_id, _), role)| {
                (stored_tenant_id == &tenant_id).then_some(role.clone())
            })
            .collect();
        values.sort_by(|left, right| left.role_id.cmp(&right.role_id));

        Ok(values)
    }

    async fn find_role_for_subject(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<Role>> {
        let memberships = self.memberships.read().await;
        let Some(role_id) = memberships.get(&(tenant_id, subject.to_owned())) else {
            return Ok(None);
        };

        Ok(self
            .roles
            .read()
            .await
            .get(&(tenant_id, role_id.clone()))
            .cloned())
    }
}
