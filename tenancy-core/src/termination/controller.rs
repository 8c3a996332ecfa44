use std::sync::Arc;

use async_trait::async_trait;
use tenancy_model::{InventoryEvent, TenantId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, info, instrument, warn};

use super::chain::{TerminationChain, production_chain};
use super::registry::{TerminatorHandle, TerminatorRegistry};
use super::terminator::TenantTerminator;
use crate::config::TerminationConfig;
use crate::error::Result;
use crate::events::EventHandler;
use crate::inventory::InventoryOps;
use crate::retry::BackoffPolicy;
use crate::scope::Scope;

/// Entry point for tenant termination. Guarantees at most one terminator per
/// tenant and forwards inventory events to the running terminators.
#[derive(Debug, Clone)]
pub struct TerminationController {
    chain: Arc<TerminationChain>,
    registry: Arc<TerminatorRegistry>,
    config: TerminationConfig,
}

impl TerminationController {
    pub fn new(chain: TerminationChain, config: TerminationConfig) -> Self {
        Self {
            chain: Arc::new(chain),
            registry: Arc::new(TerminatorRegistry::new()),
            config,
        }
    }

    /// Controller running the production chain against `ops`.
    pub fn production(ops: InventoryOps, config: TerminationConfig, retry: BackoffPolicy) -> Self {
        Self::new(production_chain(ops, config, retry), config)
    }

    /// Tenants whose termination is currently in flight.
    pub fn active_terminations(&self) -> Vec<TenantId> {
        self.registry.active_tenants()
    }

    /// Runs the whole chain for `tenant_id`. Fails at once with
    /// `AlreadyExists` while another termination of the same tenant runs.
    #[instrument(
        name = "termination.terminate_tenant",
        skip(self, scope),
        fields(tenant_id = %tenant_id),
        err
    )]
    pub async fn terminate_tenant(&self, scope: &Scope, tenant_id: TenantId) -> Result<()> {
        let (tx, rx) = mpsc::channel(self.config.inbox_capacity.max(1));
        let handle = TerminatorHandle::new(tx);
        let _registration = self.registry.put_if_absent(tenant_id, handle.clone())?;

        info!(target: "tenancy::termination", %tenant_id, steps = self.chain.len(), "tenant termination started");
        let mut terminator = TenantTerminator::new(tenant_id, Arc::clone(&self.chain), rx, handle);
        terminator.run(scope).await?;
        info!(target: "tenancy::termination", %tenant_id, "tenant termination finished");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for TerminationController {
    fn name(&self) -> &'static str {
        "termination"
    }

    async fn handle_event(&self, event: &InventoryEvent) -> Result<()> {
        // No terminator, or one whose current step does not wait on events.
        let Some(sender) = self.registry.sender(event.tenant_id) else {
            return Ok(());
        };
        match sender
            .send_timeout(event.clone(), self.config.event_send_timeout())
            .await
        {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                // The wait loop's ticker re-checks the condition regardless.
                warn!(
                    target: "tenancy::termination",
                    tenant_id = %event.tenant_id,
                    resource_kind = %event.resource_kind,
                    "terminator inbox full; event dropped"
                );
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!(target: "tenancy::termination", tenant_id = %event.tenant_id, "terminator already finished");
            }
        }
        Ok(())
    }
}
