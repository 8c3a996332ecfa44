use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tenancy_model::{InventoryEvent, ResourceKind, TenantId};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{trace, warn};

use crate::error::Result;
use crate::scope::Scope;

/// Per-terminator buffer of inventory events, shared with the tasks that
/// wait on its behalf.
pub type EventInbox = Arc<Mutex<mpsc::Receiver<InventoryEvent>>>;

/// Which events may change the outcome of a wait condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub tenant_id: TenantId,
    pub kinds: Vec<ResourceKind>,
}

impl EventFilter {
    pub fn new(tenant_id: TenantId, kinds: impl Into<Vec<ResourceKind>>) -> Self {
        Self {
            tenant_id,
            kinds: kinds.into(),
        }
    }

    pub fn matches(&self, event: &InventoryEvent) -> bool {
        event.concerns(self.tenant_id, &self.kinds)
    }
}

/// Blocks until `condition` holds or `scope` ends.
///
/// The condition is evaluated once up front and then again on every matching
/// inbox event and on every `tick`. The tick is what guarantees progress
/// when events are dropped or no inbox is attached. A failing evaluation
/// counts as "not yet".
pub async fn wait_until<F, Fut>(
    scope: &Scope,
    inbox: Option<&EventInbox>,
    filter: &EventFilter,
    tick: Duration,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    if evaluate(&mut condition, filter).await {
        return Ok(());
    }

    let mut guard = match inbox {
        Some(inbox) => Some(inbox.lock().await),
        None => None,
    };
    let mut inbox_open = guard.is_some();
    // `interval_at` rejects a zero period.
    let tick = tick.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            err = scope.done() => return Err(err),
            event = next_event(guard.as_deref_mut()), if inbox_open => match event {
                Some(event) if filter.matches(&event) => {
                    trace!(
                        target: "tenancy::termination",
                        tenant_id = %filter.tenant_id,
                        resource_kind = %event.resource_kind,
                        "re-checking wait condition on event"
                    );
                }
                Some(_) => continue,
                None => {
                    inbox_open = false;
                    continue;
                }
            },
            _ = ticker.tick() => {}
        }

        if evaluate(&mut condition, filter).await {
            return Ok(());
        }
    }
}

async fn next_event(rx: Option<&mut mpsc::Receiver<InventoryEvent>>) -> Option<InventoryEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn evaluate<F, Fut>(condition: &mut F, filter: &EventFilter) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    match condition().await {
        Ok(satisfied) => satisfied,
        Err(err) => {
            warn!(
                target: "tenancy::termination",
                tenant_id = %filter.tenant_id,
                error = %err,
                "wait condition evaluation failed"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TenancyError;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tenancy_model::{EventKind, ResourceId};

    fn host_event(tenant_id: TenantId) -> InventoryEvent {
        InventoryEvent::new(
            EventKind::Deleted,
            tenant_id,
            ResourceId::generate(ResourceKind::Host),
            ResourceKind::Host,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn matching_event_wakes_before_the_tick() {
        let tenant_id = TenantId::new();
        let (tx, rx) = mpsc::channel(4);
        let inbox: EventInbox = Arc::new(Mutex::new(rx));
        let done = Arc::new(AtomicBool::new(false));
        let tick = Duration::from_secs(3_600);

        let flag = Arc::clone(&done);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(host_event(TenantId::new())).await.unwrap();
            flag.store(true, Ordering::SeqCst);
            tx.send(host_event(tenant_id)).await.unwrap();
        });

        let start = Instant::now();
        let filter = EventFilter::new(tenant_id, [ResourceKind::Host]);
        wait_until(&Scope::default(), Some(&inbox), &filter, tick, || {
            let done = Arc::clone(&done);
            async move { Ok(done.load(Ordering::SeqCst)) }
        })
        .await
        .unwrap();
        assert!(start.elapsed() < tick);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_alone_observes_the_condition() {
        let checks = Arc::new(AtomicU32::new(0));
        let filter = EventFilter::new(TenantId::new(), [ResourceKind::Host]);
        let tick = Duration::from_secs(10);

        let start = Instant::now();
        wait_until(&Scope::default(), None, &filter, tick, || {
            let checks = Arc::clone(&checks);
            async move { Ok(checks.fetch_add(1, Ordering::SeqCst) >= 2) }
        })
        .await
        .unwrap();
        assert_eq!(checks.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= tick * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn condition_errors_do_not_abort_the_wait() {
        let checks = Arc::new(AtomicU32::new(0));
        let filter = EventFilter::new(TenantId::new(), [ResourceKind::Site]);
        wait_until(&Scope::default(), None, &filter, Duration::from_secs(1), || {
            let checks = Arc::clone(&checks);
            async move {
                if checks.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TenancyError::Unavailable("inventory".into()))
                } else {
                    Ok(true)
                }
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_tick_still_polls_the_condition() {
        let checks = Arc::new(AtomicU32::new(0));
        let filter = EventFilter::new(TenantId::new(), [ResourceKind::Host]);
        wait_until(&Scope::default(), None, &filter, Duration::ZERO, || {
            let checks = Arc::clone(&checks);
            async move { Ok(checks.fetch_add(1, Ordering::SeqCst) >= 3) }
        })
        .await
        .unwrap();
        assert_eq!(checks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn scope_deadline_ends_the_wait() {
        let scope = Scope::default().with_timeout(Duration::from_secs(5));
        let filter = EventFilter::new(TenantId::new(), [ResourceKind::Host]);
        let err = wait_until(&scope, None, &filter, Duration::from_secs(1), || async { Ok(false) })
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::DeadlineExceeded(_)));
    }
}
