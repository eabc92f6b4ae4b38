use std::sync::Arc;

use opalcms_core::{AppResult, TenantId};
use opalcms_domain::{AccessQuery, Role};

use crate::security_ports::RoleRepository;

/// Outcome of one access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// A rule (or the owner bypass) grants the action.
    Granted,
    /// The subject's role grants nothing matching the query.
    Denied,
    /// The subject's membership could not be resolved yet.
    ///
    /// Distinct from `Denied` so callers can retry or defer instead of
    /// surfacing a hard permission failure during provisioning.
    Unresolved,
}

impl AccessDecision {
    /// Returns whether the decision allows the action.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Evaluates access queries against a subject's effective role.
#[derive(Clone)]
pub struct AccessService {
    roles: Arc<dyn RoleRepository>,
}

impl AccessService {
    /// Creates a new access service.
    #[must_use]
    pub fn new(roles: Arc<dyn RoleRepository>) -> Self {
        Self { roles }
    }

    /// Checks whether `subject` may perform the queried action.
    pub async fn check(
        &self,
        tenant_id: TenantId,
        subject: &str,
        query: &AccessQuery,
    ) -> AppResult<AccessDecision> {
        let Some(role) = self.roles.find_role_for_subject(tenant_id, subject).await? else {
            tracing::debug!(%tenant_id, subject, "subject has no resolved role yet");
            return Ok(AccessDecision::Unresolved);
        };

        if Self::evaluate(&role, query) {
            Ok(AccessDecision::Granted)
        } else {
            Ok(AccessDecision::Denied)
        }
    }

    /// Pure evaluation of one role against one query.
    #[must_use]
    pub fn evaluate(role: &Role, query: &AccessQuery) -> bool {
        role.permits(query)
    }
}
