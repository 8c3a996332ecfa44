use std::{any::type_name, fmt, sync::Arc};

use tenancy_model::{LifecycleState, Resource, ResourceKind, Tenant, TenantId};
use tracing::debug;

use super::Inventory;
use crate::error::{Result, TenancyError};
use crate::scope::Scope;

/// Tenant-centric wrapper over an [`Inventory`]. Every call is bound to the
/// caller's scope.
#[derive(Clone)]
pub struct InventoryOps {
    inventory: Arc<dyn Inventory>,
}

impl fmt::Debug for InventoryOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryOps")
            .field("inventory", &type_name::<dyn Inventory>())
            .finish()
    }
}

impl InventoryOps {
    pub fn new(inventory: Arc<dyn Inventory>) -> Self {
        Self { inventory }
    }

    /// The tenant record of `tenant_id`, or `NotFound`.
    pub async fn get_tenant(&self, scope: &Scope, tenant_id: TenantId) -> Result<Tenant> {
        let listed = scope
            .run(self.inventory.list(tenant_id, ResourceKind::Tenant))
            .await?;
        let resource = listed
            .into_iter()
            .next()
            .ok_or_else(|| TenancyError::NotFound(format!("tenant {tenant_id}")))?;
        Ok(resource.into_tenant()?)
    }

    /// Creates the tenant record asking for `desired_state = created`.
    pub async fn create_tenant(&self, scope: &Scope, tenant_id: TenantId) -> Result<Tenant> {
        debug!(target: "tenancy::inventory", %tenant_id, "creating tenant record");
        let created = scope
            .run(
                self.inventory
                    .create(tenant_id, Resource::from(Tenant::requested(tenant_id))),
            )
            .await?;
        Ok(created.into_tenant()?)
    }

    /// Moves the tenant's current state to `state`, which must be its desired
    /// state. Writes nothing when the state is already reached.
    pub async fn set_tenant_current_state(
        &self,
        scope: &Scope,
        tenant: &Tenant,
        state: LifecycleState,
    ) -> Result<Tenant> {
        let mut updated = tenant.clone();
        if !updated.advance_current_state(state)? {
            return Ok(updated);
        }
        debug!(
            target: "tenancy::inventory",
            tenant_id = %tenant.tenant_id,
            %state,
            "updating tenant current state"
        );
        let stored = scope
            .run(self.inventory.update(tenant.tenant_id, Resource::from(updated)))
            .await?;
        Ok(stored.into_tenant()?)
    }

    pub async fn soft_delete_tenant(&self, scope: &Scope, tenant_id: TenantId) -> Result<()> {
        self.soft_delete_all(scope, tenant_id, ResourceKind::Tenant).await
    }

    pub async fn hard_delete_tenant(&self, scope: &Scope, tenant_id: TenantId) -> Result<()> {
        self.hard_delete_all(scope, tenant_id, ResourceKind::Tenant).await
    }

    /// Number of resources of `kind` the tenant still owns.
    pub async fn count(&self, scope: &Scope, tenant_id: TenantId, kind: ResourceKind) -> Result<usize> {
        let found = scope.run(self.inventory.find(tenant_id, kind)).await?;
        Ok(found.len())
    }

    pub async fn list(
        &self,
        scope: &Scope,
        tenant_id: TenantId,
        kind: ResourceKind,
    ) -> Result<Vec<Resource>> {
        scope.run(self.inventory.list(tenant_id, kind)).await
    }

    pub async fn create(&self, scope: &Scope, tenant_id: TenantId, resource: Resource) -> Result<Resource> {
        scope.run(self.inventory.create(tenant_id, resource)).await
    }

    pub async fn soft_delete_all(
        &self,
        scope: &Scope,
        tenant_id: TenantId,
        kind: ResourceKind,
    ) -> Result<()> {
        debug!(target: "tenancy::inventory", %tenant_id, resource_kind = %kind, "soft deleting");
        scope
            .run(self.inventory.delete_all_resources(tenant_id, kind, false))
            .await
    }

    pub async fn hard_delete_all(
        &self,
        scope: &Scope,
        tenant_id: TenantId,
        kind: ResourceKind,
    ) -> Result<()> {
        debug!(target: "tenancy::inventory", %tenant_id, resource_kind = %kind, "hard deleting");
        scope
            .run(self.inventory.delete_all_resources(tenant_id, kind, true))
            .await
    }
}
