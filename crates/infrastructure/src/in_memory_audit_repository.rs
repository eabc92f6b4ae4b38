use async_trait::async_trait;
use opalcms_application::{AuditEvent, AuditRepository};
use opalcms_core::{AppResult, TenantId};
use tokio::sync::RwLock;

/// In-memory append-only audit log.
#[derive(Debug, Default)]
pub struct InMemoryAuditRepository {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditRepository {
    /// Creates an empty in-memory audit log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Returns the tenant's events in append order.
    pub async fn events_for_tenant(&self, tenant_id: TenantId) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| event.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        tracing::debug!(
            tenant_id = %event.tenant_id,
            action = event.action.as_str(),
            resource_id = event.resource_id,
            "audit event"
        );
        self.events.write().await.push(event);
        Ok(())
    }
}
