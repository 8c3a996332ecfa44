//! The inventory collaborator.
//!
//! The inventory is the shared resource graph every tenant lives in. The
//! controllers only ever reach it through [`Inventory`], wrapped by
//! [`InventoryOps`] for the tenant-centric calls they actually make.

mod memory;
mod ops;

pub use memory::{Convergence, InMemoryInventory};
pub use ops::InventoryOps;

use async_trait::async_trait;
use tenancy_model::{Resource, ResourceId, ResourceKind, TenantId};

use crate::error::Result;

/// Operations the core needs from the inventory. Every call is tenant-scoped.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// All resources of `kind` owned by `tenant_id`.
    async fn list(&self, tenant_id: TenantId, kind: ResourceKind) -> Result<Vec<Resource>>;

    /// Identifiers of every resource of `kind` owned by `tenant_id`.
    async fn find(&self, tenant_id: TenantId, kind: ResourceKind) -> Result<Vec<ResourceId>>;

    async fn get(&self, tenant_id: TenantId, resource_id: &ResourceId) -> Result<Resource>;

    /// Creates `resource` under `tenant_id` and returns the stored copy with
    /// its assigned identifier.
    async fn create(&self, tenant_id: TenantId, resource: Resource) -> Result<Resource>;

    async fn update(&self, tenant_id: TenantId, resource: Resource) -> Result<Resource>;

    async fn delete(&self, tenant_id: TenantId, resource_id: &ResourceId) -> Result<()>;

    /// Deletes every resource of `kind` owned by `tenant_id`.
    ///
    /// With `enforce` the records are removed outright. Without it only the
    /// desired state of lifecycle-bearing resources is set to deleted and the
    /// owning resource managers remove them once they have converged.
    async fn delete_all_resources(
        &self,
        tenant_id: TenantId,
        kind: ResourceKind,
        enforce: bool,
    ) -> Result<()>;
}
