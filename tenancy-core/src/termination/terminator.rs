use std::sync::Arc;
use std::time::Instant;

use tenancy_model::{InventoryEvent, TenantId};
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use super::chain::{ExecutionStatus, StepContext, TerminationChain};
use super::registry::TerminatorHandle;
use super::wait::EventInbox;
use crate::error::Result;
use crate::scope::Scope;

/// Walks a termination chain for one tenant.
#[derive(Debug)]
pub struct TenantTerminator {
    tenant_id: TenantId,
    chain: Arc<TerminationChain>,
    status: ExecutionStatus,
    inbox: EventInbox,
    handle: TerminatorHandle,
}

impl TenantTerminator {
    pub fn new(
        tenant_id: TenantId,
        chain: Arc<TerminationChain>,
        inbox: mpsc::Receiver<InventoryEvent>,
        handle: TerminatorHandle,
    ) -> Self {
        let status = ExecutionStatus::for_chain(&chain);
        Self {
            tenant_id,
            chain,
            status,
            inbox: Arc::new(Mutex::new(inbox)),
            handle,
        }
    }

    /// Runs the pending steps strictly in order. The first failing step
    /// aborts the run; already executed steps are skipped on a later call.
    pub async fn run(&mut self, scope: &Scope) -> Result<()> {
        for (index, step) in self.chain.steps().iter().enumerate() {
            if self.status.is_executed(index) {
                continue;
            }
            let started = Instant::now();
            info!(
                target: "tenancy::termination",
                tenant_id = %self.tenant_id,
                step = index,
                resource_kind = %step.kind,
                strategy = step.strategy.name(),
                "termination step started"
            );

            let ctx = StepContext {
                scope,
                tenant_id: self.tenant_id,
                kind: step.kind,
                inbox: step.watch_events.then_some(&self.inbox),
            };
            // Events are only forwarded while a step can consume them.
            self.handle.set_watching(step.watch_events);
            let result = step.strategy.terminate(&ctx).await;
            if step.watch_events {
                self.handle.set_watching(false);
                self.drain_inbox().await;
            }
            if let Err(err) = result {
                warn!(
                    target: "tenancy::termination",
                    tenant_id = %self.tenant_id,
                    step = index,
                    resource_kind = %step.kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "termination step failed"
                );
                return Err(err);
            }

            self.status.mark_executed(index);
            info!(
                target: "tenancy::termination",
                tenant_id = %self.tenant_id,
                step = index,
                resource_kind = %step.kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "termination step finished"
            );
        }
        Ok(())
    }

    async fn drain_inbox(&self) {
        let mut inbox = self.inbox.lock().await;
        while inbox.try_recv().is_ok() {}
    }
}
