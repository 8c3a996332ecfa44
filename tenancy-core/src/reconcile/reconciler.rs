use std::collections::HashMap;
use std::fmt::{self, Display};
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::error::TenancyError;
use crate::retry::BackoffPolicy;
use crate::scope::Scope;

/// Terminal verdict of one reconcile attempt.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Converged; forget the key.
    Ack,
    /// Give up on the key without retrying.
    Fail(TenancyError),
    /// Try again after the next backoff delay.
    Retry(TenancyError),
}

/// Drives one key toward convergence.
#[async_trait]
pub trait Reconciler<K>: Send + Sync
where
    K: Send + Sync,
{
    fn name(&self) -> &'static str;

    async fn reconcile(&self, scope: &Scope, key: &K) -> ReconcileOutcome;
}

/// Per-key work table. A key is processed by at most one task at a time;
/// signals arriving while it is in flight collapse into a single follow-up
/// run once the current attempt completes.
pub struct KeyedReconcileLoop<K> {
    name: &'static str,
    reconciler: Arc<dyn Reconciler<K>>,
    backoff: BackoffPolicy,
    permits: Arc<Semaphore>,
    table: Arc<Mutex<HashMap<K, bool>>>,
    shutdown: CancellationToken,
}

impl<K: Send + Sync> fmt::Debug for KeyedReconcileLoop<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedReconcileLoop")
            .field("name", &self.name)
            .field("reconciler", &self.reconciler.name())
            .field("backoff", &self.backoff)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl<K> KeyedReconcileLoop<K>
where
    K: Clone + Eq + Hash + Display + Send + Sync + 'static,
{
    pub fn new(
        reconciler: Arc<dyn Reconciler<K>>,
        backoff: BackoffPolicy,
        parallelism: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name: reconciler.name(),
            reconciler,
            backoff,
            permits: Arc::new(Semaphore::new(parallelism.max(1))),
            table: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    /// Keys currently queued, running or backing off.
    pub fn in_flight(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Schedules `key`. A key already being worked on is flagged for one more
    /// pass instead of being started twice.
    pub fn enqueue(&self, key: K) {
        if self.shutdown.is_cancelled() {
            return;
        }
        {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(requeue) = table.get_mut(&key) {
                *requeue = true;
                debug!(target: "tenancy::reconcile", reconciler = self.name, %key, "key in flight; requeue flagged");
                return;
            }
            table.insert(key.clone(), false);
        }

        let worker = KeyWorker {
            name: self.name,
            reconciler: Arc::clone(&self.reconciler),
            backoff: self.backoff,
            permits: Arc::clone(&self.permits),
            table: Arc::clone(&self.table),
            shutdown: self.shutdown.clone(),
        };
        let span = info_span!("reconcile", reconciler = self.name, key = %key);
        tokio::spawn(worker.run(key).instrument(span));
    }
}

struct KeyWorker<K> {
    name: &'static str,
    reconciler: Arc<dyn Reconciler<K>>,
    backoff: BackoffPolicy,
    permits: Arc<Semaphore>,
    table: Arc<Mutex<HashMap<K, bool>>>,
    shutdown: CancellationToken,
}

impl<K> KeyWorker<K>
where
    K: Clone + Eq + Hash + Display + Send + Sync + 'static,
{
    async fn run(self, key: K) {
        let scope = Scope::root(self.shutdown.child_token());
        let mut attempt: u32 = 0;
        loop {
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            attempt += 1;
            let outcome = self.reconciler.reconcile(&scope, &key).await;
            drop(permit);

            match outcome {
                ReconcileOutcome::Ack => {
                    debug!(target: "tenancy::reconcile", reconciler = self.name, %key, attempt, "reconciled");
                    if self.take_requeue(&key) {
                        attempt = 0;
                        continue;
                    }
                    return;
                }
                ReconcileOutcome::Fail(err) => {
                    error!(target: "tenancy::reconcile", reconciler = self.name, %key, attempt, error = %err, "reconcile failed permanently");
                    if self.take_requeue(&key) {
                        attempt = 0;
                        continue;
                    }
                    return;
                }
                ReconcileOutcome::Retry(err) => {
                    if self.backoff.exhausted(attempt) {
                        error!(target: "tenancy::reconcile", reconciler = self.name, %key, attempt, error = %err, "giving up after retries");
                        if self.take_requeue(&key) {
                            attempt = 0;
                            continue;
                        }
                        return;
                    }
                    self.clear_requeue(&key);
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        target: "tenancy::reconcile",
                        reconciler = self.name,
                        %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "reconcile will be retried"
                    );
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        self.release(&key);
    }

    /// Consumes a pending requeue, or releases the key atomically so that a
    /// concurrent `enqueue` starts a fresh worker.
    fn take_requeue(&self, key: &K) -> bool {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        match table.get_mut(key) {
            Some(requeue) if *requeue => {
                *requeue = false;
                true
            }
            _ => {
                table.remove(key);
                false
            }
        }
    }

    fn clear_requeue(&self, key: &K) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(requeue) = table.get_mut(key) {
            *requeue = false;
        }
    }

    fn release(&self, key: &K) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedReconciler {
        calls: AtomicU32,
        retries_before_ack: u32,
        running: AtomicUsize,
        max_running: AtomicUsize,
        hold: Duration,
    }

    impl ScriptedReconciler {
        fn new(retries_before_ack: u32, hold: Duration) -> Self {
            Self {
                calls: AtomicU32::new(0),
                retries_before_ack,
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                hold,
            }
        }
    }

    #[async_trait]
    impl Reconciler<u32> for ScriptedReconciler {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn reconcile(&self, _scope: &Scope, _key: &u32) -> ReconcileOutcome {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.retries_before_ack {
                ReconcileOutcome::Retry(TenancyError::Unavailable("inventory".into()))
            } else {
                ReconcileOutcome::Ack
            }
        }
    }

    fn backoff() -> BackoffPolicy {
        BackoffPolicy::new(RetryConfig {
            initial_interval_ms: 100,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_interval_ms: 1_000,
            max_attempts: 0,
        })
    }

    async fn drained<K>(lp: &KeyedReconcileLoop<K>)
    where
        K: Clone + Eq + Hash + Display + Send + Sync + 'static,
    {
        while lp.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_ack_then_forgets_key() {
        let reconciler = Arc::new(ScriptedReconciler::new(2, Duration::ZERO));
        let lp = KeyedReconcileLoop::new(
            Arc::clone(&reconciler) as Arc<dyn Reconciler<u32>>,
            backoff(),
            1,
            CancellationToken::new(),
        );
        lp.enqueue(7);
        drained(&lp).await;
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn signals_during_flight_collapse_into_one_rerun() {
        let reconciler = Arc::new(ScriptedReconciler::new(0, Duration::from_millis(50)));
        let lp = KeyedReconcileLoop::new(
            Arc::clone(&reconciler) as Arc<dyn Reconciler<u32>>,
            backoff(),
            4,
            CancellationToken::new(),
        );
        lp.enqueue(1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        lp.enqueue(1);
        lp.enqueue(1);
        lp.enqueue(1);
        drained(&lp).await;
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(reconciler.max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn parallelism_bounds_distinct_keys() {
        let reconciler = Arc::new(ScriptedReconciler::new(0, Duration::from_millis(50)));
        let lp = KeyedReconcileLoop::new(
            Arc::clone(&reconciler) as Arc<dyn Reconciler<u32>>,
            backoff(),
            2,
            CancellationToken::new(),
        );
        for key in 0..6 {
            lp.enqueue(key);
        }
        drained(&lp).await;
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 6);
        assert_eq!(reconciler.max_running.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn debug_output_names_the_reconciler() {
        let lp = KeyedReconcileLoop::new(
            Arc::new(ScriptedReconciler::new(0, Duration::ZERO)) as Arc<dyn Reconciler<u32>>,
            backoff(),
            3,
            CancellationToken::new(),
        );
        let rendered = format!("{lp:?}");
        assert!(rendered.contains("scripted"));
        assert!(rendered.contains("available_permits: 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_backoff() {
        let reconciler = Arc::new(ScriptedReconciler::new(u32::MAX, Duration::ZERO));
        let shutdown = CancellationToken::new();
        let lp = KeyedReconcileLoop::new(
            Arc::clone(&reconciler) as Arc<dyn Reconciler<u32>>,
            backoff(),
            1,
            shutdown.clone(),
        );
        lp.enqueue(3);
        tokio::time::sleep(Duration::from_millis(5)).await;
        shutdown.cancel();
        drained(&lp).await;
        lp.enqueue(3);
        assert_eq!(lp.in_flight(), 0);
    }
}
