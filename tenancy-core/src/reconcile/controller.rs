use std::{any::type_name, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tenancy_model::{ActiveWatcher, Project, ProjectId, WatcherStatus};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reconciler::{KeyedReconcileLoop, ReconcileOutcome, Reconciler};
use crate::config::ReconcilerConfig;
use crate::datamodel::{ProjectDatamodel, ProjectSignals};
use crate::error::{Result, TenancyError};
use crate::initialization::InitializationController;
use crate::retry::BackoffPolicy;
use crate::scope::Scope;
use crate::termination::TerminationController;

async fn report_failure(
    datamodel: &dyn ProjectDatamodel,
    watcher: &ActiveWatcher,
    project_id: ProjectId,
    err: &TenancyError,
) {
    let message = format!("{}: {err}", err.code());
    if let Err(report_err) = datamodel.report_error(watcher, &message, project_id).await {
        warn!(
            target: "tenancy::reconcile",
            %project_id,
            error = %report_err,
            "failed to report error on active watcher"
        );
    }
}

async fn mark_in_progress(
    datamodel: &dyn ProjectDatamodel,
    mut watcher: ActiveWatcher,
    message: &str,
) -> Result<ActiveWatcher> {
    watcher.set_status(WatcherStatus::InProgress, message);
    datamodel.update_active_watcher(&watcher).await
}

/// Creation lane: project → active watcher → tenant initialization.
pub struct CreationReconciler {
    datamodel: Arc<dyn ProjectDatamodel>,
    initialization: Arc<InitializationController>,
    timeout: Duration,
}

impl fmt::Debug for CreationReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationReconciler")
            .field("datamodel", &type_name::<dyn ProjectDatamodel>())
            .field("initialization", &self.initialization)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CreationReconciler {
    pub fn new(
        datamodel: Arc<dyn ProjectDatamodel>,
        initialization: Arc<InitializationController>,
        timeout: Duration,
    ) -> Self {
        Self {
            datamodel,
            initialization,
            timeout,
        }
    }

    /// Registers the watcher, or fetches the one registered by an earlier
    /// attempt.
    async fn watcher_for(&self, scope: &Scope, project: &Project) -> Result<ActiveWatcher> {
        match scope.run(self.datamodel.register_active_watcher(project)).await {
            Ok(watcher) => Ok(watcher),
            Err(err) if err.is_already_exists() => {
                scope.run(self.datamodel.get_active_watcher(project.uid)).await
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Reconciler<ProjectId> for CreationReconciler {
    fn name(&self) -> &'static str {
        "project_creation"
    }

    async fn reconcile(&self, scope: &Scope, project_id: &ProjectId) -> ReconcileOutcome {
        let project_id = *project_id;
        let project = match scope
            .run(self.datamodel.get_runtime_project_by_uid(project_id))
            .await
        {
            Ok(project) if project.deletion_requested => {
                debug!(target: "tenancy::reconcile", %project_id, "project is being deleted; skipping creation");
                return ReconcileOutcome::Ack;
            }
            Ok(project) => project,
            Err(err) if err.is_not_found() => {
                debug!(target: "tenancy::reconcile", %project_id, "project gone; nothing to create");
                return ReconcileOutcome::Ack;
            }
            Err(err) => return ReconcileOutcome::Retry(err),
        };

        let mut watcher = match self.watcher_for(scope, &project).await {
            Ok(watcher) => watcher,
            Err(err) => return ReconcileOutcome::Retry(err),
        };
        if !watcher.is_idle() {
            watcher = match mark_in_progress(self.datamodel.as_ref(), watcher, "initializing tenant").await {
                Ok(watcher) => watcher,
                Err(err) => return ReconcileOutcome::Retry(err),
            };
        }

        let init_scope = scope.with_timeout(self.timeout);
        match self.initialization.initialize_tenant(&init_scope, project_id).await {
            Ok(()) => ReconcileOutcome::Ack,
            Err(err) => {
                report_failure(self.datamodel.as_ref(), &watcher, project_id, &err).await;
                if err.is_permanent() {
                    ReconcileOutcome::Fail(err)
                } else {
                    ReconcileOutcome::Retry(err)
                }
            }
        }
    }
}

/// Termination lane: project → tenant termination → watcher removal.
pub struct TerminationReconciler {
    datamodel: Arc<dyn ProjectDatamodel>,
    termination: Arc<TerminationController>,
    timeout: Duration,
}

impl fmt::Debug for TerminationReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminationReconciler")
            .field("datamodel", &type_name::<dyn ProjectDatamodel>())
            .field("termination", &self.termination)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TerminationReconciler {
    pub fn new(
        datamodel: Arc<dyn ProjectDatamodel>,
        termination: Arc<TerminationController>,
        timeout: Duration,
    ) -> Self {
        Self {
            datamodel,
            termination,
            timeout,
        }
    }
}

#[async_trait]
impl Reconciler<ProjectId> for TerminationReconciler {
    fn name(&self) -> &'static str {
        "project_termination"
    }

    async fn reconcile(&self, scope: &Scope, project_id: &ProjectId) -> ReconcileOutcome {
        let project_id = *project_id;
        match scope
            .run(self.datamodel.get_runtime_project_by_uid(project_id))
            .await
        {
            Ok(project) if !project.deletion_requested => {
                debug!(target: "tenancy::reconcile", %project_id, "project not marked for deletion");
                return ReconcileOutcome::Ack;
            }
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                debug!(target: "tenancy::reconcile", %project_id, "project already finalized");
                return ReconcileOutcome::Ack;
            }
            Err(err) => return ReconcileOutcome::Retry(err),
        }

        let watcher = match scope.run(self.datamodel.get_active_watcher(project_id)).await {
            Ok(watcher) => {
                match mark_in_progress(self.datamodel.as_ref(), watcher, "terminating tenant").await
                {
                    Ok(watcher) => Some(watcher),
                    Err(err) => return ReconcileOutcome::Retry(err),
                }
            }
            Err(err) if err.is_not_found() => None,
            Err(err) => return ReconcileOutcome::Retry(err),
        };

        let term_scope = scope.with_timeout(self.timeout);
        if let Err(err) = self.termination.terminate_tenant(&term_scope, project_id).await {
            if let Some(watcher) = &watcher {
                report_failure(self.datamodel.as_ref(), watcher, project_id, &err).await;
            }
            return ReconcileOutcome::Retry(err);
        }

        match scope.run(self.datamodel.delete_active_watcher(project_id)).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return ReconcileOutcome::Fail(err),
        }
        info!(target: "tenancy::reconcile", %project_id, "project tenant terminated");
        ReconcileOutcome::Ack
    }
}

/// Bridges project lifecycle signals into tenant initialization and
/// termination through two independent keyed loops.
pub struct ProjectReconciliationController {
    datamodel: Arc<dyn ProjectDatamodel>,
    creation: KeyedReconcileLoop<ProjectId>,
    termination: KeyedReconcileLoop<ProjectId>,
    resync_interval: Option<Duration>,
    workers: CancellationToken,
}

impl fmt::Debug for ProjectReconciliationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectReconciliationController")
            .field("datamodel", &type_name::<dyn ProjectDatamodel>())
            .field("creation", &self.creation)
            .field("termination", &self.termination)
            .field("resync_interval", &self.resync_interval)
            .finish()
    }
}

impl ProjectReconciliationController {
    pub fn new(
        datamodel: Arc<dyn ProjectDatamodel>,
        initialization: Arc<InitializationController>,
        termination: Arc<TerminationController>,
        config: ReconcilerConfig,
    ) -> Self {
        let workers = CancellationToken::new();
        let creation = KeyedReconcileLoop::new(
            Arc::new(CreationReconciler::new(
                Arc::clone(&datamodel),
                initialization,
                config.initialize_timeout(),
            )),
            BackoffPolicy::from(config.creation_backoff),
            config.parallelism,
            workers.clone(),
        );
        let termination = KeyedReconcileLoop::new(
            Arc::new(TerminationReconciler::new(
                Arc::clone(&datamodel),
                termination,
                config.terminate_timeout(),
            )),
            BackoffPolicy::from(config.termination_backoff),
            config.parallelism,
            workers.clone(),
        );
        Self {
            datamodel,
            creation,
            termination,
            resync_interval: config.resync_interval(),
            workers,
        }
    }

    /// Keys currently owned by the creation and termination loops.
    pub fn in_flight(&self) -> (usize, usize) {
        (self.creation.in_flight(), self.termination.in_flight())
    }

    /// Feeds both loops until `shutdown` fires (`Ok`) or either signal stream
    /// closes (`EventSourceClosed`). Workers are stopped on every exit path.
    pub async fn run(&self, shutdown: CancellationToken, signals: ProjectSignals) -> Result<()> {
        let _stop_workers = self.workers.clone().drop_guard();
        let ProjectSignals {
            mut to_initialize,
            mut to_terminate,
        } = signals;

        let resync_every = self.resync_interval.unwrap_or(Duration::from_secs(3_600));
        let mut resync =
            tokio::time::interval_at(tokio::time::Instant::now() + resync_every, resync_every);
        resync.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            target: "tenancy::reconcile",
            resync_ms = self.resync_interval.map(|d| d.as_millis() as u64),
            "project reconciliation started"
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(target: "tenancy::reconcile", "project reconciliation shutting down");
                    return Ok(());
                }
                id = to_terminate.recv() => match id {
                    Some(project_id) => self.termination.enqueue(project_id),
                    None => {
                        return Err(TenancyError::EventSourceClosed(
                            "project termination stream closed".into(),
                        ));
                    }
                },
                id = to_initialize.recv() => match id {
                    Some(project_id) => self.creation.enqueue(project_id),
                    None => {
                        return Err(TenancyError::EventSourceClosed(
                            "project initialization stream closed".into(),
                        ));
                    }
                },
                _ = resync.tick(), if self.resync_interval.is_some() => {
                    match self.datamodel.resync().await {
                        Ok(count) => debug!(target: "tenancy::reconcile", count, "datamodel resync requested"),
                        Err(err) => warn!(target: "tenancy::reconcile", error = %err, "datamodel resync failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::{InitializationConfig, TerminationConfig};
    use crate::initialization::ResourceDefinitionSource;
    use crate::inventory::{Convergence, InMemoryInventory, Inventory, InventoryOps};
    use crate::termination::{StepContext, TerminationChain, TerminationStep, TerminationStrategy};
    use tenancy_model::{Resource, ResourceKind, TenantId};

    /// Datamodel holding a single project, recording every call.
    #[derive(Default)]
    struct ScriptedDatamodel {
        project: Mutex<Option<Project>>,
        watcher: Mutex<Option<ActiveWatcher>>,
        register_conflict: bool,
        fail_watcher_delete: bool,
        calls: Mutex<Vec<&'static str>>,
        reports: Mutex<Vec<String>>,
    }

    impl ScriptedDatamodel {
        fn with_project(project: Project) -> Self {
            Self {
                project: Mutex::new(Some(project)),
                ..Self::default()
            }
        }

        fn with_watcher(self, watcher: ActiveWatcher) -> Self {
            *self.watcher.lock().unwrap() = Some(watcher);
            self
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn reports(&self) -> Vec<String> {
            self.reports.lock().unwrap().clone()
        }

        fn watcher(&self) -> Option<ActiveWatcher> {
            self.watcher.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProjectDatamodel for ScriptedDatamodel {
        async fn get_runtime_project_by_uid(&self, project_id: ProjectId) -> Result<Project> {
            self.record("get_project");
            self.project
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| TenancyError::NotFound(format!("project {project_id}")))
        }

        async fn register_active_watcher(&self, project: &Project) -> Result<ActiveWatcher> {
            self.record("register_watcher");
            if self.register_conflict {
                return Err(TenancyError::AlreadyExists("active watcher".into()));
            }
            let watcher = ActiveWatcher::new(project.uid, "tenant-controller");
            *self.watcher.lock().unwrap() = Some(watcher.clone());
            Ok(watcher)
        }

        async fn get_active_watcher(&self, _project_id: ProjectId) -> Result<ActiveWatcher> {
            self.record("get_watcher");
            self.watcher()
                .ok_or_else(|| TenancyError::NotFound("active watcher".into()))
        }

        async fn update_active_watcher(&self, watcher: &ActiveWatcher) -> Result<ActiveWatcher> {
            self.record("update_watcher");
            *self.watcher.lock().unwrap() = Some(watcher.clone());
            Ok(watcher.clone())
        }

        async fn delete_active_watcher(&self, _project_id: ProjectId) -> Result<()> {
            self.record("delete_watcher");
            if self.fail_watcher_delete {
                return Err(TenancyError::Unavailable("datamodel offline".into()));
            }
            match self.watcher.lock().unwrap().take() {
                Some(_) => Ok(()),
                None => Err(TenancyError::NotFound("active watcher".into())),
            }
        }

        async fn report_error(
            &self,
            _watcher: &ActiveWatcher,
            message: &str,
            _tenant_id: TenantId,
        ) -> Result<()> {
            self.record("report_error");
            self.reports.lock().unwrap().push(message.to_string());
            Ok(())
        }

        async fn resync(&self) -> Result<usize> {
            Ok(0)
        }
    }

    struct UnreachableSource;

    impl ResourceDefinitionSource for UnreachableSource {
        fn name(&self) -> String {
            "unreachable".into()
        }

        fn get(&self) -> Result<Vec<Resource>> {
            Err(TenancyError::Unavailable("definition store offline".into()))
        }
    }

    struct OfflineStep;

    #[async_trait]
    impl TerminationStrategy for OfflineStep {
        fn name(&self) -> &'static str {
            "offline"
        }

        async fn terminate(&self, _ctx: &StepContext<'_>) -> Result<()> {
            Err(TenancyError::Unavailable("inventory offline".into()))
        }
    }

    fn creation(
        datamodel: &Arc<ScriptedDatamodel>,
        sources: Vec<Arc<dyn ResourceDefinitionSource>>,
    ) -> (CreationReconciler, InMemoryInventory) {
        let (inventory, _events) = InMemoryInventory::new(Convergence::Manual);
        let shared: Arc<dyn ProjectDatamodel> = datamodel.clone();
        let initialization = InitializationController::new(
            InventoryOps::new(Arc::new(inventory.clone())),
            Arc::clone(&shared),
            sources,
            InitializationConfig::default(),
        );
        let reconciler =
            CreationReconciler::new(shared, Arc::new(initialization), Duration::from_secs(30));
        (reconciler, inventory)
    }

    fn termination(
        datamodel: &Arc<ScriptedDatamodel>,
        chain: TerminationChain,
    ) -> TerminationReconciler {
        let controller = TerminationController::new(chain, TerminationConfig::default());
        TerminationReconciler::new(
            datamodel.clone(),
            Arc::new(controller),
            Duration::from_secs(30),
        )
    }

    fn doomed(project_id: ProjectId) -> Project {
        Project {
            deletion_requested: true,
            ..Project::new(project_id, "doomed")
        }
    }

    #[tokio::test]
    async fn creation_reuses_watcher_registered_earlier() {
        let project_id = ProjectId::new();
        let mut earlier = ActiveWatcher::new(project_id, "tenant-controller");
        earlier.set_status(WatcherStatus::Error, "inventory unavailable");
        let datamodel = Arc::new(ScriptedDatamodel {
            register_conflict: true,
            ..ScriptedDatamodel::with_project(Project::new(project_id, "alpha"))
                .with_watcher(earlier)
        });
        let (reconciler, inventory) = creation(&datamodel, Vec::new());

        let outcome = reconciler.reconcile(&Scope::default(), &project_id).await;
        assert!(matches!(outcome, ReconcileOutcome::Ack));
        assert_eq!(
            datamodel.calls(),
            vec!["get_project", "register_watcher", "get_watcher", "update_watcher"]
        );
        let watcher = datamodel.watcher().unwrap();
        assert_eq!(watcher.status, WatcherStatus::InProgress);
        assert_eq!(watcher.message, "initializing tenant");
        assert_eq!(
            inventory.list(project_id, ResourceKind::Tenant).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn transient_initialization_failure_is_reported_then_retried() {
        let project_id = ProjectId::new();
        let datamodel = Arc::new(ScriptedDatamodel::with_project(Project::new(
            project_id, "beta",
        )));
        let (reconciler, inventory) = creation(&datamodel, vec![Arc::new(UnreachableSource)]);

        let outcome = reconciler.reconcile(&Scope::default(), &project_id).await;
        assert!(matches!(outcome, ReconcileOutcome::Retry(TenancyError::Unavailable(_))));
        assert_eq!(datamodel.calls().last(), Some(&"report_error"));
        let reports = datamodel.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("UNAVAILABLE"));
        assert!(inventory.snapshot(project_id).await.is_empty());
    }

    #[tokio::test]
    async fn creation_skips_projects_being_deleted() {
        let project_id = ProjectId::new();
        let datamodel = Arc::new(ScriptedDatamodel::with_project(doomed(project_id)));
        let (reconciler, inventory) = creation(&datamodel, Vec::new());

        let outcome = reconciler.reconcile(&Scope::default(), &project_id).await;
        assert!(matches!(outcome, ReconcileOutcome::Ack));
        assert_eq!(datamodel.calls(), vec!["get_project"]);
        assert!(inventory.snapshot(project_id).await.is_empty());
    }

    #[tokio::test]
    async fn live_project_is_not_terminated() {
        let project_id = ProjectId::new();
        let datamodel = Arc::new(ScriptedDatamodel::with_project(Project::new(
            project_id, "gamma",
        )));
        let reconciler = termination(
            &datamodel,
            TerminationChain::new(vec![TerminationStep::new(
                ResourceKind::Host,
                Arc::new(OfflineStep),
            )]),
        );

        let outcome = reconciler.reconcile(&Scope::default(), &project_id).await;
        assert!(matches!(outcome, ReconcileOutcome::Ack));
        assert_eq!(datamodel.calls(), vec!["get_project"]);
    }

    #[tokio::test]
    async fn failed_termination_is_reported_and_retried() {
        let project_id = ProjectId::new();
        let datamodel = Arc::new(
            ScriptedDatamodel::with_project(doomed(project_id))
                .with_watcher(ActiveWatcher::new(project_id, "tenant-controller")),
        );
        let reconciler = termination(
            &datamodel,
            TerminationChain::new(vec![TerminationStep::new(
                ResourceKind::Host,
                Arc::new(OfflineStep),
            )]),
        );

        let outcome = reconciler.reconcile(&Scope::default(), &project_id).await;
        assert!(matches!(outcome, ReconcileOutcome::Retry(TenancyError::Unavailable(_))));
        assert_eq!(
            datamodel.calls(),
            vec!["get_project", "get_watcher", "update_watcher", "report_error"]
        );
        assert!(datamodel.watcher().is_some());
    }

    #[tokio::test]
    async fn watcher_removal_failure_after_termination_is_terminal() {
        let project_id = ProjectId::new();
        let datamodel = Arc::new(ScriptedDatamodel {
            fail_watcher_delete: true,
            ..ScriptedDatamodel::with_project(doomed(project_id))
                .with_watcher(ActiveWatcher::new(project_id, "tenant-controller"))
        });
        let reconciler = termination(&datamodel, TerminationChain::default());

        let outcome = reconciler.reconcile(&Scope::default(), &project_id).await;
        assert!(matches!(outcome, ReconcileOutcome::Fail(TenancyError::Unavailable(_))));
        assert_eq!(datamodel.calls().last(), Some(&"delete_watcher"));
    }

    #[tokio::test]
    async fn termination_proceeds_without_a_watcher() {
        let project_id = ProjectId::new();
        let datamodel = Arc::new(ScriptedDatamodel::with_project(doomed(project_id)));
        let reconciler = termination(&datamodel, TerminationChain::default());

        let outcome = reconciler.reconcile(&Scope::default(), &project_id).await;
        assert!(matches!(outcome, ReconcileOutcome::Ack));
        assert_eq!(
            datamodel.calls(),
            vec!["get_project", "get_watcher", "delete_watcher"]
        );
    }
}
