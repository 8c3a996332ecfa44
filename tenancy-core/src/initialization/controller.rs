use std::{any::type_name, fmt, sync::Arc};

use async_trait::async_trait;
use tenancy_model::{
    EventKind, InventoryEvent, LifecycleState, Resource, ResourceKind, TenantId, WatcherStatus,
};
use tracing::{debug, info, instrument, warn};

use super::compare::resources_equivalent;
use super::source::ResourceDefinitionSource;
use crate::cache::{ListCache, ListQuery};
use crate::config::InitializationConfig;
use crate::datamodel::ProjectDatamodel;
use crate::error::{Result, TenancyError};
use crate::events::EventHandler;
use crate::inventory::InventoryOps;
use crate::scope::Scope;

/// Provisions tenants and acknowledges their creation.
#[derive(Clone)]
pub struct InitializationController {
    ops: InventoryOps,
    datamodel: Arc<dyn ProjectDatamodel>,
    sources: Vec<Arc<dyn ResourceDefinitionSource>>,
    config: InitializationConfig,
}

impl fmt::Debug for InitializationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<String> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("InitializationController")
            .field("ops", &self.ops)
            .field("datamodel", &type_name::<dyn ProjectDatamodel>())
            .field("sources", &sources)
            .field("config", &self.config)
            .finish()
    }
}

impl InitializationController {
    pub fn new(
        ops: InventoryOps,
        datamodel: Arc<dyn ProjectDatamodel>,
        sources: Vec<Arc<dyn ResourceDefinitionSource>>,
        config: InitializationConfig,
    ) -> Self {
        Self {
            ops,
            datamodel,
            sources,
            config,
        }
    }

    /// Creates the baseline resources and then the tenant record. A tenant
    /// whose record exists is left untouched, and baseline resources that
    /// already exist are not created twice.
    #[instrument(
        name = "initialization.initialize_tenant",
        skip(self, scope),
        fields(tenant_id = %tenant_id),
        err
    )]
    pub async fn initialize_tenant(&self, scope: &Scope, tenant_id: TenantId) -> Result<()> {
        let scope = scope.with_timeout(self.config.timeout());
        match self.ops.get_tenant(&scope, tenant_id).await {
            Ok(_) => {
                debug!(target: "tenancy::initialization", %tenant_id, "tenant already initialized");
                return Ok(());
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let cache = ListCache::new();
        let mut provisioned: Vec<Resource> = Vec::new();
        let (mut created, mut skipped) = (0_usize, 0_usize);

        for source in &self.sources {
            for candidate in load_definitions(source).await? {
                let kind = candidate.kind();
                if kind == ResourceKind::Tenant {
                    warn!(
                        target: "tenancy::initialization",
                        source = %source.name(),
                        "ignoring tenant record in resource definitions"
                    );
                    continue;
                }

                let existing = cache
                    .get_or_fetch(ListQuery::new(tenant_id, kind), |query| {
                        self.ops.list(&scope, query.tenant_id, query.kind)
                    })
                    .await?;
                let present = existing
                    .iter()
                    .chain(provisioned.iter())
                    .any(|resource| resources_equivalent(resource, &candidate));
                if present {
                    skipped += 1;
                    continue;
                }

                let mut stamped = candidate.with_tenant(tenant_id);
                stamped.resource_id = None;
                let stored = self.ops.create(&scope, tenant_id, stamped).await?;
                debug!(
                    target: "tenancy::initialization",
                    %tenant_id,
                    resource_kind = %kind,
                    resource_id = ?stored.resource_id,
                    "created baseline resource"
                );
                provisioned.push(stored);
                created += 1;
            }
        }

        match self.ops.create_tenant(&scope, tenant_id).await {
            Ok(_) => {}
            Err(err) if err.is_already_exists() => {
                debug!(target: "tenancy::initialization", %tenant_id, "tenant record created concurrently");
            }
            Err(err) => return Err(err),
        }
        info!(target: "tenancy::initialization", %tenant_id, created, skipped, "tenant initialized");
        Ok(())
    }

    async fn mark_watcher_idle(&self, scope: &Scope, tenant_id: TenantId) -> Result<()> {
        let mut watcher = match scope.run(self.datamodel.get_active_watcher(tenant_id)).await {
            Ok(watcher) => watcher,
            Err(err) if err.is_not_found() => {
                debug!(target: "tenancy::initialization", %tenant_id, "no active watcher to update");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if watcher.is_idle() {
            return Ok(());
        }
        watcher.set_status(WatcherStatus::Idle, "tenant initialized");
        scope.run(self.datamodel.update_active_watcher(&watcher)).await?;
        info!(target: "tenancy::initialization", %tenant_id, "active watcher idle");
        Ok(())
    }
}

/// Sources may hit the filesystem, so they are read on the blocking pool.
async fn load_definitions(source: &Arc<dyn ResourceDefinitionSource>) -> Result<Vec<Resource>> {
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || source.get())
        .await
        .map_err(|err| TenancyError::Internal(format!("definition source task failed: {err}")))?
}

#[async_trait]
impl EventHandler for InitializationController {
    fn name(&self) -> &'static str {
        "initialization"
    }

    async fn handle_event(&self, event: &InventoryEvent) -> Result<()> {
        if event.resource_kind != ResourceKind::Tenant || event.kind == EventKind::Deleted {
            return Ok(());
        }
        let tenant_id = event.tenant_id;
        let scope = Scope::default().with_timeout(self.config.timeout());

        // The event snapshot may be stale, so read the record fresh.
        let mut tenant = match self.ops.get_tenant(&scope, tenant_id).await {
            Ok(tenant) => tenant,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };

        if tenant.awaiting_creation() {
            tenant = self
                .ops
                .set_tenant_current_state(&scope, &tenant, LifecycleState::Created)
                .await?;
        }

        if tenant.desired_state == LifecycleState::Created
            && tenant.is_created()
            && tenant.watcher_os_manager
        {
            self.mark_watcher_idle(&scope, tenant_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::InMemoryProjectDatamodel;
    use crate::initialization::StaticDefinitions;
    use crate::inventory::{Convergence, InMemoryInventory, Inventory};
    use tenancy_model::{Provider, ResourceBody};

    fn baseline() -> Arc<dyn ResourceDefinitionSource> {
        let provider = Resource::new(ResourceBody::Provider(Provider {
            name: "infra_onboarding".into(),
            vendor: "baremetal".into(),
            ..Provider::default()
        }));
        Arc::new(StaticDefinitions::new("baseline", vec![provider.clone(), provider]))
    }

    #[tokio::test]
    async fn duplicate_definitions_are_created_once() {
        let (inventory, _events) = InMemoryInventory::new(Convergence::Manual);
        let (datamodel, _signals) = InMemoryProjectDatamodel::new("tenant-controller");
        let controller = InitializationController::new(
            InventoryOps::new(Arc::new(inventory.clone())),
            Arc::new(datamodel),
            vec![baseline()],
            InitializationConfig::default(),
        );
        let tenant_id = TenantId::new();

        controller
            .initialize_tenant(&Scope::default(), tenant_id)
            .await
            .unwrap();
        let providers = inventory.list(tenant_id, ResourceKind::Provider).await.unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].tenant_id, Some(tenant_id));

        let tenant = inventory.list(tenant_id, ResourceKind::Tenant).await.unwrap();
        assert_eq!(tenant.len(), 1);
        assert_eq!(
            tenant[0].body.desired_state(),
            Some(LifecycleState::Created)
        );
    }

    /// Stands in for a definition file on slow storage.
    struct SlowSource;

    impl ResourceDefinitionSource for SlowSource {
        fn name(&self) -> String {
            "slow".into()
        }

        fn get(&self) -> Result<Vec<Resource>> {
            std::thread::sleep(std::time::Duration::from_millis(200));
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn slow_sources_do_not_stall_the_runtime() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let (inventory, _events) = InMemoryInventory::new(Convergence::Manual);
        let (datamodel, _signals) = InMemoryProjectDatamodel::new("tenant-controller");
        let controller = InitializationController::new(
            InventoryOps::new(Arc::new(inventory)),
            Arc::new(datamodel),
            vec![Arc::new(SlowSource)],
            InitializationConfig::default(),
        );

        let ticks = Arc::new(AtomicU32::new(0));
        let ticker = tokio::spawn({
            let ticks = Arc::clone(&ticks);
            async move {
                loop {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        controller
            .initialize_tenant(&Scope::default(), TenantId::new())
            .await
            .unwrap();
        ticker.abort();
        assert!(ticks.load(Ordering::SeqCst) >= 5);
    }
}
