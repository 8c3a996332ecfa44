use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tenancy_model::{
    EventKind, InventoryEvent, LifecycleState, Resource, ResourceBody, ResourceId, ResourceKind,
    TenantId,
};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};

use super::Inventory;
use crate::error::{Result, TenancyError};

/// How the simulated resource managers react to soft deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Convergence {
    /// Nothing converges until [`InMemoryInventory::converge`] is called.
    #[default]
    Manual,
    /// Owning managers act at once: new tenants get the OS-manager flag
    /// raised and soft-deleted resources are removed on the spot.
    Immediate,
}

#[derive(Default)]
struct Store {
    resources: BTreeMap<ResourceId, Resource>,
}

impl Store {
    fn of_kind(&self, tenant_id: TenantId, kind: ResourceKind) -> Vec<ResourceId> {
        self.resources
            .values()
            .filter(|r| r.tenant_id == Some(tenant_id) && r.kind() == kind)
            .filter_map(|r| r.resource_id.clone())
            .collect()
    }
}

/// Process-local inventory that emits a change event for every mutation.
#[derive(Clone)]
pub struct InMemoryInventory {
    store: Arc<Mutex<Store>>,
    events: mpsc::UnboundedSender<InventoryEvent>,
    convergence: Convergence,
}

impl fmt::Debug for InMemoryInventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryInventory")
            .field("convergence", &self.convergence)
            .finish_non_exhaustive()
    }
}

impl InMemoryInventory {
    /// Builds the inventory together with its change-notification stream.
    pub fn new(convergence: Convergence) -> (Self, mpsc::UnboundedReceiver<InventoryEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                store: Arc::new(Mutex::new(Store::default())),
                events,
                convergence,
            },
            rx,
        )
    }

    /// Every resource owned by `tenant_id`.
    pub async fn snapshot(&self, tenant_id: TenantId) -> Vec<Resource> {
        let store = self.store.lock().await;
        store
            .resources
            .values()
            .filter(|r| r.tenant_id == Some(tenant_id))
            .cloned()
            .collect()
    }

    /// Plays the owning resource managers for soft-deleted resources of
    /// `kind`: lifecycle resources asking for deletion are removed, and a
    /// tenant asking for deletion is acknowledged with its OS-manager flag
    /// cleared.
    pub async fn converge(&self, tenant_id: TenantId, kind: ResourceKind) {
        let mut store = self.store.lock().await;
        self.converge_locked(&mut store, tenant_id, kind);
    }

    /// Plays the OS resource manager raising or clearing its tenant flag.
    pub async fn set_watcher_os_manager(&self, tenant_id: TenantId, value: bool) -> Result<()> {
        let mut store = self.store.lock().await;
        let id = store
            .of_kind(tenant_id, ResourceKind::Tenant)
            .into_iter()
            .next()
            .ok_or_else(|| TenancyError::NotFound(format!("tenant {tenant_id}")))?;
        if let Some(resource) = store.resources.get_mut(&id)
            && let ResourceBody::Tenant(tenant) = &mut resource.body
            && tenant.watcher_os_manager != value
        {
            tenant.watcher_os_manager = value;
            resource.updated_at = Some(Utc::now());
            let snapshot = resource.clone();
            self.emit(EventKind::Updated, tenant_id, &snapshot);
        }
        Ok(())
    }

    fn emit(&self, kind: EventKind, tenant_id: TenantId, resource: &Resource) {
        let Some(event) = InventoryEvent::for_resource(kind, tenant_id, resource) else {
            return;
        };
        trace!(
            target: "tenancy::inventory",
            %tenant_id,
            resource_kind = %event.resource_kind,
            event = %kind,
            "emitting inventory event"
        );
        if self.events.send(event).is_err() {
            debug!(target: "tenancy::inventory", "event stream has no receiver");
        }
    }

    fn remove_locked(&self, store: &mut Store, tenant_id: TenantId, id: &ResourceId) {
        if let Some(removed) = store.resources.remove(id) {
            self.emit(EventKind::Deleted, tenant_id, &removed);
        }
    }

    fn converge_locked(&self, store: &mut Store, tenant_id: TenantId, kind: ResourceKind) {
        for id in store.of_kind(tenant_id, kind) {
            let Some(resource) = store.resources.get_mut(&id) else {
                continue;
            };
            if resource.body.desired_state() != Some(LifecycleState::Deleted) {
                continue;
            }
            if kind != ResourceKind::Tenant {
                self.remove_locked(store, tenant_id, &id);
                continue;
            }
            if let ResourceBody::Tenant(tenant) = &mut resource.body {
                if tenant.current_state == LifecycleState::Deleted && !tenant.watcher_os_manager {
                    continue;
                }
                tenant.current_state = LifecycleState::Deleted;
                tenant.watcher_os_manager = false;
                resource.updated_at = Some(Utc::now());
                let snapshot = resource.clone();
                self.emit(EventKind::Updated, tenant_id, &snapshot);
            }
        }
    }
}

#[async_trait]
impl Inventory for InMemoryInventory {
    async fn list(&self, tenant_id: TenantId, kind: ResourceKind) -> Result<Vec<Resource>> {
        let store = self.store.lock().await;
        Ok(store
            .of_kind(tenant_id, kind)
            .iter()
            .filter_map(|id| store.resources.get(id).cloned())
            .collect())
    }

    async fn find(&self, tenant_id: TenantId, kind: ResourceKind) -> Result<Vec<ResourceId>> {
        Ok(self.store.lock().await.of_kind(tenant_id, kind))
    }

    async fn get(&self, tenant_id: TenantId, resource_id: &ResourceId) -> Result<Resource> {
        let store = self.store.lock().await;
        store
            .resources
            .get(resource_id)
            .filter(|r| r.tenant_id == Some(tenant_id))
            .cloned()
            .ok_or_else(|| TenancyError::NotFound(format!("resource {resource_id}")))
    }

    async fn create(&self, tenant_id: TenantId, resource: Resource) -> Result<Resource> {
        let kind = resource.kind();
        let mut store = self.store.lock().await;

        if kind == ResourceKind::Tenant && !store.of_kind(tenant_id, kind).is_empty() {
            return Err(TenancyError::AlreadyExists(format!("tenant {tenant_id}")));
        }
        let resource_id = match resource.resource_id.clone() {
            Some(id) if store.resources.contains_key(&id) => {
                return Err(TenancyError::AlreadyExists(format!("resource {id}")));
            }
            Some(id) => id,
            None => ResourceId::generate(kind),
        };

        let now = Utc::now();
        let mut stored = resource.with_tenant(tenant_id).with_resource_id(resource_id.clone());
        stored.created_at = Some(now);
        stored.updated_at = Some(now);
        if self.convergence == Convergence::Immediate
            && let ResourceBody::Tenant(tenant) = &mut stored.body
        {
            tenant.watcher_os_manager = true;
        }

        store.resources.insert(resource_id, stored.clone());
        self.emit(EventKind::Created, tenant_id, &stored);
        Ok(stored)
    }

    async fn update(&self, tenant_id: TenantId, resource: Resource) -> Result<Resource> {
        let resource_id = resource
            .resource_id
            .clone()
            .ok_or_else(|| TenancyError::InvalidArgument("update without resource id".into()))?;
        let mut store = self.store.lock().await;
        let existing = store
            .resources
            .get(&resource_id)
            .filter(|r| r.tenant_id == Some(tenant_id))
            .ok_or_else(|| TenancyError::NotFound(format!("resource {resource_id}")))?;
        if existing.kind() != resource.kind() {
            return Err(TenancyError::InvalidArgument(format!(
                "resource {resource_id} is a {}, not a {}",
                existing.kind(),
                resource.kind()
            )));
        }

        let created_at = existing.created_at;
        let mut stored = resource.with_tenant(tenant_id);
        stored.created_at = created_at;
        stored.updated_at = Some(Utc::now());
        store.resources.insert(resource_id, stored.clone());
        self.emit(EventKind::Updated, tenant_id, &stored);
        Ok(stored)
    }

    async fn delete(&self, tenant_id: TenantId, resource_id: &ResourceId) -> Result<()> {
        let mut store = self.store.lock().await;
        let owned = store
            .resources
            .get(resource_id)
            .is_some_and(|r| r.tenant_id == Some(tenant_id));
        if !owned {
            return Err(TenancyError::NotFound(format!("resource {resource_id}")));
        }
        self.remove_locked(&mut store, tenant_id, resource_id);
        Ok(())
    }

    async fn delete_all_resources(
        &self,
        tenant_id: TenantId,
        kind: ResourceKind,
        enforce: bool,
    ) -> Result<()> {
        let mut store = self.store.lock().await;
        let ids = store.of_kind(tenant_id, kind);

        if enforce || !kind.has_lifecycle() {
            for id in &ids {
                self.remove_locked(&mut store, tenant_id, id);
            }
            return Ok(());
        }

        for id in &ids {
            let Some(resource) = store.resources.get_mut(id) else {
                continue;
            };
            if resource.body.desired_state() == Some(LifecycleState::Deleted) {
                continue;
            }
            resource.body.set_desired_state(LifecycleState::Deleted);
            resource.updated_at = Some(Utc::now());
            let snapshot = resource.clone();
            self.emit(EventKind::Updated, tenant_id, &snapshot);
        }
        if self.convergence == Convergence::Immediate {
            self.converge_locked(&mut store, tenant_id, kind);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenancy_model::{Host, Provider, Tenant};

    fn host(name: &str) -> Resource {
        Resource::new(ResourceBody::Host(Host {
            name: name.into(),
            desired_state: LifecycleState::Created,
            ..Host::default()
        }))
    }

    #[tokio::test]
    async fn mutations_emit_tenant_scoped_events() {
        let (inventory, mut events) = InMemoryInventory::new(Convergence::Manual);
        let tenant_id = TenantId::new();

        let created = inventory
            .create(tenant_id, Resource::new(ResourceBody::Provider(Provider::default())))
            .await
            .unwrap();
        let id = created.resource_id.clone().unwrap();
        assert_eq!(id.kind(), Some(ResourceKind::Provider));

        inventory.delete(tenant_id, &id).await.unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Created);
        assert_eq!(first.tenant_id, tenant_id);
        let second = events.recv().await.unwrap();
        assert_eq!(second.kind, EventKind::Deleted);
        assert_eq!(second.resource_id, id);
    }

    #[tokio::test]
    async fn tenants_are_unique_per_tenant_id() {
        let (inventory, _events) = InMemoryInventory::new(Convergence::Manual);
        let tenant_id = TenantId::new();
        let record = Resource::from(Tenant::requested(tenant_id));

        inventory.create(tenant_id, record.clone()).await.unwrap();
        let err = inventory.create(tenant_id, record).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn soft_delete_waits_for_manual_convergence() {
        let (inventory, _events) = InMemoryInventory::new(Convergence::Manual);
        let tenant_id = TenantId::new();
        inventory.create(tenant_id, host("edge-01")).await.unwrap();

        inventory
            .delete_all_resources(tenant_id, ResourceKind::Host, false)
            .await
            .unwrap();
        let remaining = inventory.list(tenant_id, ResourceKind::Host).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].body.desired_state(), Some(LifecycleState::Deleted));

        inventory.converge(tenant_id, ResourceKind::Host).await;
        assert!(inventory.find(tenant_id, ResourceKind::Host).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn immediate_convergence_acknowledges_tenants() {
        let (inventory, _events) = InMemoryInventory::new(Convergence::Immediate);
        let tenant_id = TenantId::new();
        let created = inventory
            .create(tenant_id, Resource::from(Tenant::requested(tenant_id)))
            .await
            .unwrap();
        assert!(created.as_tenant().unwrap().watcher_os_manager);

        inventory
            .delete_all_resources(tenant_id, ResourceKind::Tenant, false)
            .await
            .unwrap();
        let tenant = inventory
            .list(tenant_id, ResourceKind::Tenant)
            .await
            .unwrap()
            .remove(0)
            .into_tenant()
            .unwrap();
        assert!(!tenant.watcher_os_manager);
        assert_eq!(tenant.current_state, LifecycleState::Deleted);
    }

    #[tokio::test]
    async fn hard_delete_of_nothing_succeeds() {
        let (inventory, _events) = InMemoryInventory::new(Convergence::Manual);
        inventory
            .delete_all_resources(TenantId::new(), ResourceKind::Region, true)
            .await
            .unwrap();
    }
}
