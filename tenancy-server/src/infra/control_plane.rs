use std::{fmt, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures::future::{Either, select};
use tenancy_core::datamodel::{InMemoryProjectDatamodel, ProjectDatamodel, ProjectSignals};
use tenancy_core::initialization::{
    InitializationController, JsonFileDefinitions, ResourceDefinitionSource,
};
use tenancy_core::inventory::{Convergence, InMemoryInventory, InventoryOps};
use tenancy_core::reconcile::ProjectReconciliationController;
use tenancy_core::retry::BackoffPolicy;
use tenancy_core::termination::TerminationController;
use tenancy_core::EventDispatcher;
use tenancy_model::{InventoryEvent, ProjectId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::infra::config::Config;

/// Every controller of the process, wired against the in-memory
/// collaborators and ready to run.
pub struct ControlPlane {
    inventory: InMemoryInventory,
    datamodel: InMemoryProjectDatamodel,
    termination: Arc<TerminationController>,
    dispatcher: EventDispatcher,
    reconciliation: ProjectReconciliationController,
    events: mpsc::UnboundedReceiver<InventoryEvent>,
    signals: ProjectSignals,
}

impl fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlane")
            .field("dispatcher", &self.dispatcher)
            .field("reconciliation", &self.reconciliation)
            .finish_non_exhaustive()
    }
}

impl ControlPlane {
    /// Wires the controllers against process-local collaborators whose
    /// resource managers converge immediately.
    pub fn standalone(config: &Config) -> Self {
        let (inventory, events) = InMemoryInventory::new(Convergence::Immediate);
        let (datamodel, signals) = InMemoryProjectDatamodel::new(config.owner.clone());
        let ops = InventoryOps::new(Arc::new(inventory.clone()));
        let shared: Arc<dyn ProjectDatamodel> = Arc::new(datamodel.clone());
        let controller = &config.controller;

        let sources: Vec<Arc<dyn ResourceDefinitionSource>> = config
            .definitions
            .paths
            .iter()
            .map(|path| Arc::new(JsonFileDefinitions::new(path)) as Arc<dyn ResourceDefinitionSource>)
            .collect();

        let initialization = Arc::new(InitializationController::new(
            ops.clone(),
            Arc::clone(&shared),
            sources,
            controller.initialization,
        ));
        let termination = Arc::new(TerminationController::production(
            ops,
            controller.termination,
            BackoffPolicy::from(controller.retry),
        ));

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(initialization.clone());
        dispatcher.register(termination.clone());

        let reconciliation = ProjectReconciliationController::new(
            shared,
            initialization,
            Arc::clone(&termination),
            controller.reconciler,
        );

        Self {
            inventory,
            datamodel,
            termination,
            dispatcher,
            reconciliation,
            events,
            signals,
        }
    }

    pub fn inventory(&self) -> InMemoryInventory {
        self.inventory.clone()
    }

    pub fn datamodel(&self) -> InMemoryProjectDatamodel {
        self.datamodel.clone()
    }

    pub fn termination(&self) -> Arc<TerminationController> {
        Arc::clone(&self.termination)
    }

    /// Runs the dispatcher and the reconciliation controller until
    /// `shutdown` fires or either of them stops. A collapsed event stream is
    /// returned as an error so the supervisor restarts the process.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Self {
            dispatcher,
            reconciliation,
            events,
            signals,
            ..
        } = self;

        let dispatcher_task: JoinHandle<tenancy_core::Result<()>> = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { dispatcher.run(shutdown, events).await }
        });
        let reconcile_task: JoinHandle<tenancy_core::Result<()>> = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { reconciliation.run(shutdown, signals).await }
        });
        info!("control plane running");

        let (first, first_name, rest, rest_name) =
            match select(dispatcher_task, reconcile_task).await {
                Either::Left((done, rest)) => (done, "event dispatcher", rest, "project reconciliation"),
                Either::Right((done, rest)) => (done, "project reconciliation", rest, "event dispatcher"),
            };

        // Whichever side stopped first, the other one must not outlive it.
        shutdown.cancel();
        let rest = rest.await;

        let first = first
            .with_context(|| format!("{first_name} task panicked"))?
            .with_context(|| format!("{first_name} stopped"));
        if let Err(err) = &first {
            error!(error = %err, "control plane stopping after failure");
        }
        match rest.with_context(|| format!("{rest_name} task panicked"))? {
            Ok(()) => {}
            Err(err) => warn!(task = rest_name, error = %err, "task failed during shutdown"),
        }
        first
    }
}

/// Creates one project per name and, with `delete_after`, requests their
/// deletion once that delay has passed.
pub async fn seed_projects(
    datamodel: InMemoryProjectDatamodel,
    names: Vec<String>,
    delete_after: Option<Duration>,
    shutdown: CancellationToken,
) -> Result<Vec<ProjectId>> {
    let mut seeded = Vec::with_capacity(names.len());
    for name in names {
        let project = datamodel.create_project(name).await;
        info!(project_id = %project.uid, name = %project.name, "seeded project");
        seeded.push(project.uid);
    }

    let Some(delay) = delete_after else {
        return Ok(seeded);
    };
    tokio::select! {
        _ = shutdown.cancelled() => return Ok(seeded),
        _ = tokio::time::sleep(delay) => {}
    }
    for project_id in &seeded {
        datamodel
            .request_deletion(*project_id)
            .await
            .with_context(|| format!("failed to request deletion of project {project_id}"))?;
        info!(%project_id, "requested project deletion");
    }
    Ok(seeded)
}
