//! The external project datamodel.
//!
//! Projects are owned by an orchestrator outside this process. The controllers
//! read them, and mirror their own progress back through an
//! [`ActiveWatcher`] registered on each project.

mod memory;

pub use memory::{InMemoryProjectDatamodel, ProjectSignals};

use async_trait::async_trait;
use tenancy_model::{ActiveWatcher, Project, ProjectId, TenantId};

use crate::error::Result;

#[async_trait]
pub trait ProjectDatamodel: Send + Sync {
    async fn get_runtime_project_by_uid(&self, project_id: ProjectId) -> Result<Project>;

    /// Registers this controller's watcher on `project`. Fails with
    /// `AlreadyExists` when one is registered already.
    async fn register_active_watcher(&self, project: &Project) -> Result<ActiveWatcher>;

    async fn get_active_watcher(&self, project_id: ProjectId) -> Result<ActiveWatcher>;

    async fn update_active_watcher(&self, watcher: &ActiveWatcher) -> Result<ActiveWatcher>;

    /// Removes the watcher. Once a project asked for deletion, this releases
    /// the last hold this controller has on it.
    async fn delete_active_watcher(&self, project_id: ProjectId) -> Result<()>;

    /// Publishes a failure on the watcher so upstream consumers can see it.
    async fn report_error(
        &self,
        watcher: &ActiveWatcher,
        message: &str,
        tenant_id: TenantId,
    ) -> Result<()>;

    /// Re-emits a reconciliation signal for every live project and returns
    /// how many were sent.
    async fn resync(&self) -> Result<usize>;
}
