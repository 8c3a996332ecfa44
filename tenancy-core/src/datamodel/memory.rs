use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tenancy_model::{ActiveWatcher, Project, ProjectId, TenantId, WatcherStatus};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use super::ProjectDatamodel;
use crate::error::{Result, TenancyError};

/// The two reconciliation input streams produced by a datamodel.
#[derive(Debug)]
pub struct ProjectSignals {
    pub to_initialize: mpsc::UnboundedReceiver<ProjectId>,
    pub to_terminate: mpsc::UnboundedReceiver<ProjectId>,
}

#[derive(Default)]
struct State {
    projects: HashMap<ProjectId, Project>,
    watchers: HashMap<ProjectId, ActiveWatcher>,
    to_initialize: Option<mpsc::UnboundedSender<ProjectId>>,
    to_terminate: Option<mpsc::UnboundedSender<ProjectId>>,
}

impl State {
    fn signal_initialize(&self, project_id: ProjectId) {
        match &self.to_initialize {
            Some(tx) if tx.send(project_id).is_ok() => {}
            _ => warn!(target: "tenancy::datamodel", %project_id, "initialize signal dropped"),
        }
    }

    fn signal_terminate(&self, project_id: ProjectId) {
        match &self.to_terminate {
            Some(tx) if tx.send(project_id).is_ok() => {}
            _ => warn!(target: "tenancy::datamodel", %project_id, "terminate signal dropped"),
        }
    }
}

/// Process-local project datamodel. Creating a project signals the creation
/// loop, requesting its deletion signals the termination loop, and the
/// project disappears once its watcher has been deleted.
#[derive(Clone)]
pub struct InMemoryProjectDatamodel {
    state: Arc<Mutex<State>>,
    owner: String,
}

impl fmt::Debug for InMemoryProjectDatamodel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryProjectDatamodel")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl InMemoryProjectDatamodel {
    pub fn new(owner: impl Into<String>) -> (Self, ProjectSignals) {
        let (init_tx, to_initialize) = mpsc::unbounded_channel();
        let (term_tx, to_terminate) = mpsc::unbounded_channel();
        let state = State {
            to_initialize: Some(init_tx),
            to_terminate: Some(term_tx),
            ..State::default()
        };
        (
            Self {
                state: Arc::new(Mutex::new(state)),
                owner: owner.into(),
            },
            ProjectSignals {
                to_initialize,
                to_terminate,
            },
        )
    }

    pub async fn create_project(&self, name: impl Into<String>) -> Project {
        let project = Project::new(TenantId::new(), name);
        let mut state = self.state.lock().await;
        state.projects.insert(project.uid, project.clone());
        state.signal_initialize(project.uid);
        debug!(target: "tenancy::datamodel", project_id = %project.uid, name = %project.name, "project created");
        project
    }

    pub async fn request_deletion(&self, project_id: ProjectId) -> Result<()> {
        let mut state = self.state.lock().await;
        let project = state
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| TenancyError::NotFound(format!("project {project_id}")))?;
        project.deletion_requested = true;
        state.signal_terminate(project_id);
        debug!(target: "tenancy::datamodel", %project_id, "project deletion requested");
        Ok(())
    }

    pub async fn projects(&self) -> Vec<Project> {
        self.state.lock().await.projects.values().cloned().collect()
    }

    /// Closes both signal streams, as when the upstream connection collapses.
    pub async fn close_signals(&self) {
        let mut state = self.state.lock().await;
        state.to_initialize = None;
        state.to_terminate = None;
    }
}

#[async_trait]
impl ProjectDatamodel for InMemoryProjectDatamodel {
    async fn get_runtime_project_by_uid(&self, project_id: ProjectId) -> Result<Project> {
        self.state
            .lock()
            .await
            .projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| TenancyError::NotFound(format!("project {project_id}")))
    }

    async fn register_active_watcher(&self, project: &Project) -> Result<ActiveWatcher> {
        let mut state = self.state.lock().await;
        if !state.projects.contains_key(&project.uid) {
            return Err(TenancyError::NotFound(format!("project {}", project.uid)));
        }
        if state.watchers.contains_key(&project.uid) {
            return Err(TenancyError::AlreadyExists(format!(
                "active watcher for project {}",
                project.uid
            )));
        }
        let watcher = ActiveWatcher::new(project.uid, self.owner.clone());
        state.watchers.insert(project.uid, watcher.clone());
        Ok(watcher)
    }

    async fn get_active_watcher(&self, project_id: ProjectId) -> Result<ActiveWatcher> {
        self.state
            .lock()
            .await
            .watchers
            .get(&project_id)
            .cloned()
            .ok_or_else(|| TenancyError::NotFound(format!("active watcher for project {project_id}")))
    }

    async fn update_active_watcher(&self, watcher: &ActiveWatcher) -> Result<ActiveWatcher> {
        let mut state = self.state.lock().await;
        let stored = state.watchers.get_mut(&watcher.project_id).ok_or_else(|| {
            TenancyError::NotFound(format!("active watcher for project {}", watcher.project_id))
        })?;
        *stored = watcher.clone();
        Ok(stored.clone())
    }

    async fn delete_active_watcher(&self, project_id: ProjectId) -> Result<()> {
        let mut state = self.state.lock().await;
        let removed = state.watchers.remove(&project_id).is_some();
        // The finalizer is released even when no watcher was ever registered.
        if state
            .projects
            .get(&project_id)
            .is_some_and(|p| p.deletion_requested)
        {
            state.projects.remove(&project_id);
            debug!(target: "tenancy::datamodel", %project_id, "project finalized");
        }
        if !removed {
            return Err(TenancyError::NotFound(format!(
                "active watcher for project {project_id}"
            )));
        }
        Ok(())
    }

    async fn report_error(
        &self,
        watcher: &ActiveWatcher,
        message: &str,
        tenant_id: TenantId,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state.watchers.get_mut(&watcher.project_id).ok_or_else(|| {
            TenancyError::NotFound(format!("active watcher for project {}", watcher.project_id))
        })?;
        stored.status = WatcherStatus::Error;
        stored.message = format!("tenant {tenant_id}: {message}");
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn resync(&self) -> Result<usize> {
        let state = self.state.lock().await;
        for project in state.projects.values() {
            if project.deletion_requested {
                state.signal_terminate(project.uid);
            } else {
                state.signal_initialize(project.uid);
            }
        }
        debug!(target: "tenancy::datamodel", projects = state.projects.len(), "datamodel resynced");
        Ok(state.projects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn project_lifecycle_drives_both_signals() {
        let (datamodel, mut signals) = InMemoryProjectDatamodel::new("tenant-controller");
        let project = datamodel.create_project("alpha").await;
        assert_eq!(signals.to_initialize.recv().await, Some(project.uid));

        datamodel.register_active_watcher(&project).await.unwrap();
        datamodel.request_deletion(project.uid).await.unwrap();
        assert_eq!(signals.to_terminate.recv().await, Some(project.uid));

        // The watcher acts as a finalizer.
        assert!(datamodel.get_runtime_project_by_uid(project.uid).await.is_ok());
        datamodel.delete_active_watcher(project.uid).await.unwrap();
        let err = datamodel
            .get_runtime_project_by_uid(project.uid)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn deleted_project_without_watcher_is_still_finalized() {
        let (datamodel, mut signals) = InMemoryProjectDatamodel::new("tenant-controller");
        let project = datamodel.create_project("never-watched").await;
        datamodel.request_deletion(project.uid).await.unwrap();

        let err = datamodel.delete_active_watcher(project.uid).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(
            datamodel
                .get_runtime_project_by_uid(project.uid)
                .await
                .unwrap_err()
                .is_not_found()
        );

        while signals.to_terminate.try_recv().is_ok() {}
        assert_eq!(datamodel.resync().await.unwrap(), 0);
        assert!(signals.to_terminate.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_watchers_are_rejected() {
        let (datamodel, _signals) = InMemoryProjectDatamodel::new("tenant-controller");
        let project = datamodel.create_project("beta").await;
        datamodel.register_active_watcher(&project).await.unwrap();
        let err = datamodel.register_active_watcher(&project).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn report_error_marks_watcher() {
        let (datamodel, _signals) = InMemoryProjectDatamodel::new("tenant-controller");
        let project = datamodel.create_project("gamma").await;
        let watcher = datamodel.register_active_watcher(&project).await.unwrap();

        datamodel
            .report_error(&watcher, "inventory unavailable", project.uid)
            .await
            .unwrap();
        let stored = datamodel.get_active_watcher(project.uid).await.unwrap();
        assert_eq!(stored.status, WatcherStatus::Error);
        assert!(stored.message.contains("inventory unavailable"));
    }

    #[tokio::test]
    async fn resync_replays_live_projects() {
        let (datamodel, mut signals) = InMemoryProjectDatamodel::new("tenant-controller");
        let kept = datamodel.create_project("kept").await;
        let doomed = datamodel.create_project("doomed").await;
        datamodel.request_deletion(doomed.uid).await.unwrap();
        while signals.to_initialize.try_recv().is_ok() {}
        while signals.to_terminate.try_recv().is_ok() {}

        assert_eq!(datamodel.resync().await.unwrap(), 2);
        assert_eq!(signals.to_initialize.try_recv().ok(), Some(kept.uid));
        assert_eq!(signals.to_terminate.try_recv().ok(), Some(doomed.uid));
    }

    #[tokio::test]
    async fn closing_signals_ends_streams() {
        let (datamodel, mut signals) = InMemoryProjectDatamodel::new("tenant-controller");
        datamodel.close_signals().await;
        assert_eq!(signals.to_initialize.recv().await, None);
        assert_eq!(signals.to_terminate.recv().await, None);
    }
}
