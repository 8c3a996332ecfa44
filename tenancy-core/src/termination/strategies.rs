//! Per-kind termination strategies.

use async_trait::async_trait;
use tenancy_model::{ResourceKind, TenantId};
use tracing::{debug, info, warn};

use super::chain::{StepContext, TerminationStrategy};
use super::wait::{EventFilter, wait_until};
use crate::config::TerminationConfig;
use crate::error::{Result, TenancyError};
use crate::inventory::InventoryOps;
use crate::promise::Promise;
use crate::retry::{BackoffPolicy, retry, retry_and_handle_error};
use crate::scope::Scope;

/// Forced removal of every resource of the step's kind.
#[derive(Debug, Clone)]
pub struct HardDeletion {
    ops: InventoryOps,
    retry: BackoffPolicy,
}

impl HardDeletion {
    pub fn new(ops: InventoryOps, retry: BackoffPolicy) -> Self {
        Self { ops, retry }
    }
}

#[async_trait]
impl TerminationStrategy for HardDeletion {
    fn name(&self) -> &'static str {
        "hard_deletion"
    }

    async fn terminate(&self, ctx: &StepContext<'_>) -> Result<()> {
        retry(ctx.scope, &self.retry, || {
            self.ops.hard_delete_all(ctx.scope, ctx.tenant_id, ctx.kind)
        })
        .await
    }
}

/// Soft-deletes the tenant record and waits for the OS resource manager to
/// release it by clearing its watcher flag.
#[derive(Debug, Clone)]
pub struct TenantSoftDeletion {
    ops: InventoryOps,
    config: TerminationConfig,
    retry: BackoffPolicy,
}

impl TenantSoftDeletion {
    pub fn new(ops: InventoryOps, config: TerminationConfig, retry: BackoffPolicy) -> Self {
        Self { ops, config, retry }
    }
}

async fn os_manager_released(ops: &InventoryOps, scope: &Scope, tenant_id: TenantId) -> Result<bool> {
    match ops.get_tenant(scope, tenant_id).await {
        Ok(tenant) => Ok(!tenant.watcher_os_manager),
        Err(err) if err.is_not_found() => Ok(true),
        Err(err) => Err(err),
    }
}

#[async_trait]
impl TerminationStrategy for TenantSoftDeletion {
    fn name(&self) -> &'static str {
        "tenant_soft_deletion"
    }

    async fn terminate(&self, ctx: &StepContext<'_>) -> Result<()> {
        match self.ops.get_tenant(ctx.scope, ctx.tenant_id).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                debug!(
                    target: "tenancy::termination",
                    tenant_id = %ctx.tenant_id,
                    "tenant record already gone; skipping soft deletion"
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        let scope = ctx.scope.with_timeout(self.config.soft_delete_timeout());
        let ops = self.ops.clone();
        let inbox = ctx.inbox.cloned();
        let filter = EventFilter::new(ctx.tenant_id, [ResourceKind::Tenant]);
        let tick = self.config.wait_tick();
        let tenant_id = ctx.tenant_id;

        // Armed before the delete is issued so the release cannot slip past.
        let released = Promise::run(&scope, move |scope| async move {
            wait_until(&scope, inbox.as_ref(), &filter, tick, || {
                os_manager_released(&ops, &scope, tenant_id)
            })
            .await
        });

        retry(&scope, &self.retry, || {
            self.ops.soft_delete_tenant(&scope, tenant_id)
        })
        .await?;
        released.wait().await
    }
}

/// Requests deletion through the desired state and waits for the owning
/// resource manager to remove everything. On timeout the resources are
/// force-deleted when the fallback is enabled.
#[derive(Debug, Clone)]
pub struct SoftDeletion {
    ops: InventoryOps,
    config: TerminationConfig,
    retry: BackoffPolicy,
}

impl SoftDeletion {
    pub fn new(ops: InventoryOps, config: TerminationConfig, retry: BackoffPolicy) -> Self {
        Self { ops, config, retry }
    }

    async fn nothing_left(&self, scope: &Scope, tenant_id: TenantId, kind: ResourceKind) -> Result<bool> {
        Ok(self.ops.count(scope, tenant_id, kind).await? == 0)
    }

    async fn fallback(&self, ctx: &StepContext<'_>, cause: TenancyError) -> Result<()> {
        if !self.config.hard_delete_fallback {
            return Err(cause);
        }
        warn!(
            target: "tenancy::termination",
            tenant_id = %ctx.tenant_id,
            resource_kind = %ctx.kind,
            error = %cause,
            "soft deletion did not converge; falling back to hard deletion"
        );
        retry(ctx.scope, &self.retry, || {
            self.ops.hard_delete_all(ctx.scope, ctx.tenant_id, ctx.kind)
        })
        .await
    }
}

#[async_trait]
impl TerminationStrategy for SoftDeletion {
    fn name(&self) -> &'static str {
        "soft_deletion"
    }

    async fn terminate(&self, ctx: &StepContext<'_>) -> Result<()> {
        let scope = ctx.scope.with_timeout(self.config.soft_delete_timeout());
        let filter = EventFilter::new(ctx.tenant_id, [ctx.kind]);

        let outcome = async {
            retry_and_handle_error(
                &scope,
                &self.retry,
                || self.ops.soft_delete_all(&scope, ctx.tenant_id, ctx.kind),
                |err| self.fallback(ctx, err),
            )
            .await?;
            wait_until(&scope, ctx.inbox, &filter, self.config.wait_tick(), || {
                self.nothing_left(&scope, ctx.tenant_id, ctx.kind)
            })
            .await
        }
        .await;

        match outcome {
            Ok(()) => Ok(()),
            // Our own deadline passed while the caller's scope is still live.
            Err(err) if err.is_scope_error() && !ctx.scope.is_done() => {
                self.fallback(ctx, err).await
            }
            Err(err) => Err(err),
        }
    }
}

/// Gives the external workload owner a bounded window to remove members and
/// workloads, then force-deletes members followed by workloads.
#[derive(Debug, Clone)]
pub struct WorkloadsDeletion {
    ops: InventoryOps,
    config: TerminationConfig,
    retry: BackoffPolicy,
}

impl WorkloadsDeletion {
    pub fn new(ops: InventoryOps, config: TerminationConfig, retry: BackoffPolicy) -> Self {
        Self { ops, config, retry }
    }

    async fn cleared(&self, scope: &Scope, tenant_id: TenantId) -> Result<bool> {
        let members = self
            .ops
            .count(scope, tenant_id, ResourceKind::WorkloadMember)
            .await?;
        let workloads = self.ops.count(scope, tenant_id, ResourceKind::Workload).await?;
        Ok(members == 0 && workloads == 0)
    }
}

#[async_trait]
impl TerminationStrategy for WorkloadsDeletion {
    fn name(&self) -> &'static str {
        "workloads_deletion"
    }

    async fn terminate(&self, ctx: &StepContext<'_>) -> Result<()> {
        let scope = ctx.scope.with_timeout(self.config.workload_delete_timeout());
        let filter = EventFilter::new(
            ctx.tenant_id,
            [ResourceKind::WorkloadMember, ResourceKind::Workload],
        );

        match wait_until(&scope, ctx.inbox, &filter, self.config.wait_tick(), || {
            self.cleared(&scope, ctx.tenant_id)
        })
        .await
        {
            Ok(()) => return Ok(()),
            Err(err) if err.is_scope_error() && !ctx.scope.is_done() => {
                info!(
                    target: "tenancy::termination",
                    tenant_id = %ctx.tenant_id,
                    "workloads still present after grace period; force deleting"
                );
            }
            Err(err) => return Err(err),
        }

        for kind in [ResourceKind::WorkloadMember, ResourceKind::Workload] {
            retry(ctx.scope, &self.retry, || {
                self.ops.hard_delete_all(ctx.scope, ctx.tenant_id, kind)
            })
            .await?;
        }
        Ok(())
    }
}

/// Final step: removes the tenant record itself.
#[derive(Debug, Clone)]
pub struct TenantHardDeletion {
    ops: InventoryOps,
    retry: BackoffPolicy,
}

impl TenantHardDeletion {
    pub fn new(ops: InventoryOps, retry: BackoffPolicy) -> Self {
        Self { ops, retry }
    }
}

#[async_trait]
impl TerminationStrategy for TenantHardDeletion {
    fn name(&self) -> &'static str {
        "tenant_hard_deletion"
    }

    async fn terminate(&self, ctx: &StepContext<'_>) -> Result<()> {
        match self.ops.get_tenant(ctx.scope, ctx.tenant_id).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        }
        retry(ctx.scope, &self.retry, || {
            self.ops.hard_delete_tenant(ctx.scope, ctx.tenant_id)
        })
        .await
    }
}
