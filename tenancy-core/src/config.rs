use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level knobs consumed by the controllers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Retry/backoff policy shared by every inventory mutation.
    pub retry: RetryConfig,
    pub termination: TerminationConfig,
    pub initialization: InitializationConfig,
    pub reconciler: ReconcilerConfig,
}

/// Exponential backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    /// Spread applied around each delay, e.g. 0.5 gives delay ±50%.
    pub randomization_factor: f64,
    pub max_interval_ms: u64,
    /// Total attempts including the first; 0 means unbounded.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval_ms: 10_000,
            max_attempts: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationConfig {
    /// Bound on a single soft deletion (mass update plus convergence wait).
    pub soft_delete_timeout_ms: u64,
    /// How long the external owner gets to remove workloads before they are
    /// force-deleted.
    pub workload_delete_timeout_ms: u64,
    /// Re-check cadence of wait conditions, covering dropped events.
    pub wait_tick_ms: u64,
    /// Per-terminator budget for handing over one inventory event.
    pub event_send_timeout_ms: u64,
    /// Buffer of each terminator's event inbox.
    pub inbox_capacity: usize,
    /// Fall back to hard deletion when a soft deletion times out.
    pub hard_delete_fallback: bool,
}

impl TerminationConfig {
    pub fn soft_delete_timeout(&self) -> Duration {
        Duration::from_millis(self.soft_delete_timeout_ms)
    }

    pub fn workload_delete_timeout(&self) -> Duration {
        Duration::from_millis(self.workload_delete_timeout_ms)
    }

    pub fn wait_tick(&self) -> Duration {
        Duration::from_millis(self.wait_tick_ms)
    }

    pub fn event_send_timeout(&self) -> Duration {
        Duration::from_millis(self.event_send_timeout_ms)
    }
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            soft_delete_timeout_ms: 5 * 60 * 1_000,
            workload_delete_timeout_ms: 2 * 60 * 1_000,
            wait_tick_ms: 10_000,
            event_send_timeout_ms: 100,
            inbox_capacity: 64,
            hard_delete_fallback: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializationConfig {
    /// Bound on a single `initialize_tenant` pass.
    pub timeout_ms: u64,
}

impl InitializationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for InitializationConfig {
    fn default() -> Self {
        Self { timeout_ms: 60_000 }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Keys processed concurrently per loop. Kept low to spare the inventory.
    pub parallelism: usize,
    pub initialize_timeout_ms: u64,
    pub terminate_timeout_ms: u64,
    /// Interval between datamodel resyncs; 0 disables them.
    pub resync_interval_ms: u64,
    pub creation_backoff: RetryConfig,
    pub termination_backoff: RetryConfig,
}

impl ReconcilerConfig {
    pub fn initialize_timeout(&self) -> Duration {
        Duration::from_millis(self.initialize_timeout_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_ms > 0).then(|| Duration::from_millis(self.resync_interval_ms))
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            parallelism: 2,
            initialize_timeout_ms: 2 * 60 * 1_000,
            terminate_timeout_ms: 20 * 60 * 1_000,
            resync_interval_ms: 0,
            creation_backoff: RetryConfig {
                initial_interval_ms: 1_000,
                multiplier: 2.0,
                randomization_factor: 0.25,
                max_interval_ms: 60_000,
                max_attempts: 0,
            },
            termination_backoff: RetryConfig {
                initial_interval_ms: 5_000,
                multiplier: 2.0,
                randomization_factor: 0.25,
                max_interval_ms: 5 * 60 * 1_000,
                max_attempts: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: ControllerConfig =
            serde_json::from_str(r#"{"termination":{"hard_delete_fallback":false}}"#).unwrap();
        assert!(!cfg.termination.hard_delete_fallback);
        assert_eq!(cfg.termination.wait_tick_ms, TerminationConfig::default().wait_tick_ms);
        assert_eq!(cfg.retry, RetryConfig::default());
    }

    #[test]
    fn resync_is_disabled_by_zero() {
        let cfg = ReconcilerConfig::default();
        assert!(cfg.resync_interval().is_none());
    }
}
