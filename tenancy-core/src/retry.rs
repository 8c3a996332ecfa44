use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{Result, TenancyError};
use crate::scope::Scope;

/// Exponential backoff derived from a [`RetryConfig`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    config: RetryConfig,
}

impl From<RetryConfig> for BackoffPolicy {
    fn from(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(RetryConfig::default())
    }
}

impl BackoffPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// True once `attempts` calls have been made and the policy allows no more.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.config.max_attempts != 0 && attempts >= self.config.max_attempts
    }

    /// Un-randomised delay to wait after the `attempt`-th failure (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let scaled = (self.config.initial_interval_ms as f64) * self.config.multiplier.powi(exp);
        let capped = scaled.min(self.config.max_interval_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Delay after the `attempt`-th failure with the randomization factor applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let anchor = self.base_delay(attempt).as_millis() as f64;
        let factor = self.config.randomization_factor.clamp(0.0, 1.0);
        if anchor == 0.0 || factor == 0.0 {
            return Duration::from_millis(anchor as u64);
        }
        let spread = anchor * factor;
        let lower = (anchor - spread).max(0.0);
        let upper = anchor + spread;
        let jittered = rand::rng().random_range(lower..=upper);
        Duration::from_millis(jittered.round() as u64)
    }
}

/// Re-invokes `op` until it succeeds or the policy is exhausted. Every error
/// is treated as retryable; the last one is returned on exhaustion.
pub async fn retry<T, F, Fut>(scope: &Scope, policy: &BackoffPolicy, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_and_handle_error(scope, policy, op, |err| async move { Err(err) }).await
}

/// Like [`retry`], but hands the final error to `on_exhausted` instead of
/// returning it.
pub async fn retry_and_handle_error<T, F, Fut, H, HFut>(
    scope: &Scope,
    policy: &BackoffPolicy,
    mut op: F,
    on_exhausted: H,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    H: FnOnce(TenancyError) -> HFut,
    HFut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        if let Some(err) = scope.err() {
            return Err(err);
        }
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if policy.exhausted(attempt) {
            warn!(target: "tenancy::retry", attempt, error = %err, "retries exhausted");
            return on_exhausted(err).await;
        }

        let delay = policy.delay(attempt);
        debug!(
            target: "tenancy::retry",
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "operation failed; backing off"
        );
        scope.sleep(delay).await?;
    }
}
