#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tenancy_core::config::{RetryConfig, TerminationConfig};
use tenancy_core::datamodel::ProjectDatamodel;
use tenancy_core::inventory::{InMemoryInventory, Inventory};
use tenancy_core::retry::BackoffPolicy;
use tenancy_core::{Result, TenancyError};
use tenancy_model::{
    ActiveWatcher, Project, ProjectId, Resource, ResourceId, ResourceKind, TenantId,
};

/// Inventory call observed by [`RecordingInventory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(ResourceKind),
    Update(ResourceKind),
    Delete,
    DeleteAll { kind: ResourceKind, enforce: bool },
}

/// Wraps an in-memory inventory and records every mutation it forwards.
#[derive(Clone)]
pub struct RecordingInventory {
    pub inner: InMemoryInventory,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingInventory {
    pub fn new(inner: InMemoryInventory) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// `(kind, enforce)` of every `delete_all_resources` call, in order.
    pub fn bulk_deletes(&self) -> Vec<(ResourceKind, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::DeleteAll { kind, enforce } => Some((kind, enforce)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Inventory for RecordingInventory {
    async fn list(&self, tenant_id: TenantId, kind: ResourceKind) -> Result<Vec<Resource>> {
        self.inner.list(tenant_id, kind).await
    }

    async fn find(&self, tenant_id: TenantId, kind: ResourceKind) -> Result<Vec<ResourceId>> {
        self.inner.find(tenant_id, kind).await
    }

    async fn get(&self, tenant_id: TenantId, resource_id: &ResourceId) -> Result<Resource> {
        self.inner.get(tenant_id, resource_id).await
    }

    async fn create(&self, tenant_id: TenantId, resource: Resource) -> Result<Resource> {
        self.record(Call::Create(resource.kind()));
        self.inner.create(tenant_id, resource).await
    }

    async fn update(&self, tenant_id: TenantId, resource: Resource) -> Result<Resource> {
        self.record(Call::Update(resource.kind()));
        self.inner.update(tenant_id, resource).await
    }

    async fn delete(&self, tenant_id: TenantId, resource_id: &ResourceId) -> Result<()> {
        self.record(Call::Delete);
        self.inner.delete(tenant_id, resource_id).await
    }

    async fn delete_all_resources(
        &self,
        tenant_id: TenantId,
        kind: ResourceKind,
        enforce: bool,
    ) -> Result<()> {
        self.record(Call::DeleteAll { kind, enforce });
        self.inner.delete_all_resources(tenant_id, kind, enforce).await
    }
}

/// Datamodel whose watcher updates always fail. Reads hand out a fresh
/// in-progress watcher.
#[derive(Default)]
pub struct FailingWatcherDatamodel {
    pub updates: Mutex<usize>,
}

#[async_trait]
impl ProjectDatamodel for FailingWatcherDatamodel {
    async fn get_runtime_project_by_uid(&self, project_id: ProjectId) -> Result<Project> {
        Ok(Project::new(project_id, "failing"))
    }

    async fn register_active_watcher(&self, project: &Project) -> Result<ActiveWatcher> {
        Ok(ActiveWatcher::new(project.uid, "tenant-controller"))
    }

    async fn get_active_watcher(&self, project_id: ProjectId) -> Result<ActiveWatcher> {
        Ok(ActiveWatcher::new(project_id, "tenant-controller"))
    }

    async fn update_active_watcher(&self, _watcher: &ActiveWatcher) -> Result<ActiveWatcher> {
        *self.updates.lock().unwrap() += 1;
        Err(TenancyError::Unavailable("datamodel offline".into()))
    }

    async fn delete_active_watcher(&self, _project_id: ProjectId) -> Result<()> {
        Ok(())
    }

    async fn report_error(
        &self,
        _watcher: &ActiveWatcher,
        _message: &str,
        _tenant_id: TenantId,
    ) -> Result<()> {
        Ok(())
    }

    async fn resync(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Short, jitter-free retries.
pub fn fast_policy() -> BackoffPolicy {
    BackoffPolicy::new(RetryConfig {
        initial_interval_ms: 10,
        multiplier: 1.0,
        randomization_factor: 0.0,
        max_interval_ms: 10,
        max_attempts: 3,
    })
}

pub fn fast_termination() -> TerminationConfig {
    TerminationConfig {
        soft_delete_timeout_ms: 2_000,
        workload_delete_timeout_ms: 1_000,
        wait_tick_ms: 100,
        ..TerminationConfig::default()
    }
}

/// Polls `check` until it holds, failing the test after a generous bound.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition never reached: {what}");
}
