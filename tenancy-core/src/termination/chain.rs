use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tenancy_model::{ResourceKind, TenantId};

use super::strategies::{
    HardDeletion, SoftDeletion, TenantHardDeletion, TenantSoftDeletion, WorkloadsDeletion,
};
use super::wait::EventInbox;
use crate::config::TerminationConfig;
use crate::error::Result;
use crate::inventory::InventoryOps;
use crate::retry::BackoffPolicy;
use crate::scope::Scope;

/// What a strategy gets to work with for one step of one tenant.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub scope: &'a Scope,
    pub tenant_id: TenantId,
    pub kind: ResourceKind,
    /// Present only on steps that watch inventory events.
    pub inbox: Option<&'a EventInbox>,
}

/// Removes every resource of one kind for one tenant. Implementations must be
/// idempotent: removing something already gone is success.
#[async_trait]
pub trait TerminationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn terminate(&self, ctx: &StepContext<'_>) -> Result<()>;
}

#[derive(Clone)]
pub struct TerminationStep {
    pub kind: ResourceKind,
    pub watch_events: bool,
    pub strategy: Arc<dyn TerminationStrategy>,
}

impl TerminationStep {
    pub fn new(kind: ResourceKind, strategy: Arc<dyn TerminationStrategy>) -> Self {
        Self {
            kind,
            watch_events: false,
            strategy,
        }
    }

    pub fn watching(kind: ResourceKind, strategy: Arc<dyn TerminationStrategy>) -> Self {
        Self {
            kind,
            watch_events: true,
            strategy,
        }
    }
}

impl fmt::Debug for TerminationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminationStep")
            .field("kind", &self.kind)
            .field("watch_events", &self.watch_events)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

/// Immutable, ordered list of termination steps shared by every terminator.
#[derive(Debug, Clone, Default)]
pub struct TerminationChain {
    steps: Vec<TerminationStep>,
}

impl TerminationChain {
    pub fn new(steps: Vec<TerminationStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[TerminationStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// `(kind, strategy)` pairs in execution order.
    pub fn plan(&self) -> Vec<(ResourceKind, &'static str)> {
        self.steps
            .iter()
            .map(|step| (step.kind, step.strategy.name()))
            .collect()
    }
}

/// Positional record of which steps of a chain have completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    executed: Vec<bool>,
}

impl ExecutionStatus {
    pub fn for_chain(chain: &TerminationChain) -> Self {
        Self {
            executed: vec![false; chain.len()],
        }
    }

    pub fn mark_executed(&mut self, index: usize) {
        if let Some(slot) = self.executed.get_mut(index) {
            *slot = true;
        }
    }

    pub fn is_executed(&self, index: usize) -> bool {
        self.executed.get(index).copied().unwrap_or(false)
    }

    pub fn executed_count(&self) -> usize {
        self.executed.iter().filter(|done| **done).count()
    }

    pub fn is_complete(&self) -> bool {
        self.executed.iter().all(|done| *done)
    }
}

/// The compiled-in production order. Dependents are removed before the
/// resources they reference, since the inventory does not cascade.
pub fn production_chain(
    ops: InventoryOps,
    config: TerminationConfig,
    retry: BackoffPolicy,
) -> TerminationChain {
    let hard: Arc<dyn TerminationStrategy> = Arc::new(HardDeletion::new(ops.clone(), retry));
    let soft: Arc<dyn TerminationStrategy> =
        Arc::new(SoftDeletion::new(ops.clone(), config, retry));

    TerminationChain::new(vec![
        TerminationStep::watching(
            ResourceKind::Tenant,
            Arc::new(TenantSoftDeletion::new(ops.clone(), config, retry)),
        ),
        TerminationStep::new(ResourceKind::TelemetryProfile, Arc::clone(&hard)),
        TerminationStep::new(ResourceKind::TelemetryGroup, Arc::clone(&hard)),
        TerminationStep::new(ResourceKind::SingleSchedule, Arc::clone(&hard)),
        TerminationStep::new(ResourceKind::RepeatedSchedule, Arc::clone(&hard)),
        TerminationStep::watching(
            ResourceKind::Workload,
            Arc::new(WorkloadsDeletion::new(ops.clone(), config, retry)),
        ),
        TerminationStep::watching(ResourceKind::Instance, Arc::clone(&soft)),
        TerminationStep::watching(ResourceKind::Host, soft),
        TerminationStep::new(ResourceKind::Os, Arc::clone(&hard)),
        TerminationStep::new(ResourceKind::Endpoint, Arc::clone(&hard)),
        TerminationStep::new(ResourceKind::NetworkSegment, Arc::clone(&hard)),
        TerminationStep::new(ResourceKind::Site, Arc::clone(&hard)),
        TerminationStep::new(ResourceKind::Region, Arc::clone(&hard)),
        TerminationStep::new(ResourceKind::Provider, Arc::clone(&hard)),
        TerminationStep::new(ResourceKind::Ou, Arc::clone(&hard)),
        TerminationStep::new(ResourceKind::LocalAccount, hard),
        TerminationStep::new(
            ResourceKind::Tenant,
            Arc::new(TenantHardDeletion::new(ops, retry)),
        ),
    ])
}
