use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tenancy_model::{InventoryEvent, TenantId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, TenancyError};

/// Registry side of a running terminator: its inbox sender and whether the
/// current step is waiting on inventory events.
#[derive(Debug, Clone)]
pub struct TerminatorHandle {
    sender: mpsc::Sender<InventoryEvent>,
    watching: Arc<AtomicBool>,
}

impl TerminatorHandle {
    pub fn new(sender: mpsc::Sender<InventoryEvent>) -> Self {
        Self {
            sender,
            watching: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::Acquire)
    }

    pub fn set_watching(&self, watching: bool) {
        self.watching.store(watching, Ordering::Release);
    }
}

/// Tenants with an in-flight terminator. At most one entry exists per tenant.
#[derive(Debug, Default)]
pub struct TerminatorRegistry {
    inner: RwLock<HashMap<TenantId, TerminatorHandle>>,
}

impl TerminatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims `tenant_id`. A second claim while the first is held
    /// fails with `AlreadyExists`. The entry lives as long as the returned
    /// guard.
    pub fn put_if_absent(
        self: &Arc<Self>,
        tenant_id: TenantId,
        handle: TerminatorHandle,
    ) -> Result<RegistrationGuard> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&tenant_id) {
            return Err(TenancyError::AlreadyExists(format!(
                "termination of tenant {tenant_id} already in progress"
            )));
        }
        map.insert(tenant_id, handle);
        debug!(target: "tenancy::termination", %tenant_id, "terminator registered");
        Ok(RegistrationGuard {
            registry: Arc::clone(self),
            tenant_id,
        })
    }

    pub fn remove(&self, tenant_id: TenantId) -> bool {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(&tenant_id).is_some()
    }

    /// Inbox sender of the tenant's terminator, present only while its
    /// current step waits on inventory events.
    pub fn sender(&self, tenant_id: TenantId) -> Option<mpsc::Sender<InventoryEvent>> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&tenant_id)
            .filter(|handle| handle.is_watching())
            .map(|handle| handle.sender.clone())
    }

    pub fn active_tenants(&self) -> Vec<TenantId> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut tenants: Vec<TenantId> = map.keys().copied().collect();
        tenants.sort();
        tenants
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases a tenant's registry entry on drop, on every exit path.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<TerminatorRegistry>,
    tenant_id: TenantId,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if self.registry.remove(self.tenant_id) {
            debug!(target: "tenancy::termination", tenant_id = %self.tenant_id, "terminator released");
        }
    }
}
