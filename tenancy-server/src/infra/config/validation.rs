use thiserror::Error;

use super::models::Config;
use tenancy_core::config::RetryConfig;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("reconciler parallelism must be at least 1")]
    ZeroParallelism,
    #[error("termination wait tick must be greater than zero")]
    ZeroWaitTick,
    #[error("terminator inbox capacity must be at least 1")]
    ZeroInboxCapacity,
    #[error("{field} multiplier must be at least 1.0 (got {value})")]
    InvalidMultiplier { field: &'static str, value: f64 },
    #[error("{field} randomization factor must be within 0.0..=1.0 (got {value})")]
    InvalidRandomization { field: &'static str, value: f64 },
    #[error("resource definition file not found: {path}")]
    MissingDefinitions { path: std::path::PathBuf },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();
    let controller = &config.controller;

    if controller.reconciler.parallelism == 0 {
        return Err(ConfigGuardRailError::ZeroParallelism);
    }
    if controller.termination.wait_tick_ms == 0 {
        return Err(ConfigGuardRailError::ZeroWaitTick);
    }
    if controller.termination.inbox_capacity == 0 {
        return Err(ConfigGuardRailError::ZeroInboxCapacity);
    }

    validate_backoff("retry", &controller.retry)?;
    validate_backoff("reconciler.creation_backoff", &controller.reconciler.creation_backoff)?;
    validate_backoff(
        "reconciler.termination_backoff",
        &controller.reconciler.termination_backoff,
    )?;

    for path in &config.definitions.paths {
        if !path.exists() {
            return Err(ConfigGuardRailError::MissingDefinitions { path: path.clone() });
        }
    }

    if controller.termination.wait_tick_ms >= controller.termination.soft_delete_timeout_ms {
        warnings.push_with_hint(
            "termination wait tick is not shorter than the soft deletion timeout; dropped events will surface as timeouts",
            "Lower termination.wait_tick_ms or TENANCY_WAIT_TICK_MS",
        );
    }

    if !controller.termination.hard_delete_fallback {
        warnings.push_with_hint(
            "hard deletion fallback disabled; soft deletions that never converge keep failing termination",
            "Set termination.hard_delete_fallback = true or TENANCY_HARD_DELETE_FALLBACK=true",
        );
    }

    if config.definitions.paths.is_empty() {
        warnings.push_with_hint(
            "no resource definition sources configured; new tenants only receive their tenant record",
            "List JSON files under definitions.paths or in TENANCY_DEFINITION_PATHS",
        );
    }

    if controller.retry.max_attempts == 0 {
        warnings.push("inventory retries are unbounded; a failing step retries until its scope expires");
    }

    Ok(warnings)
}

fn validate_backoff(field: &'static str, retry: &RetryConfig) -> Result<(), ConfigGuardRailError> {
    if retry.multiplier < 1.0 {
        return Err(ConfigGuardRailError::InvalidMultiplier {
            field,
            value: retry.multiplier,
        });
    }
    if !(0.0..=1.0).contains(&retry.randomization_factor) {
        return Err(ConfigGuardRailError::InvalidRandomization {
            field,
            value: retry.randomization_factor,
        });
    }
    Ok(())
}
