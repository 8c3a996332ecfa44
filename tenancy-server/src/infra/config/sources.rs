use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tenancy_core::config::{
    InitializationConfig, ReconcilerConfig, RetryConfig, TerminationConfig,
};

/// Raw configuration as defined in a TOML file. Sections left out fall back
/// to the controller defaults.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub definitions: FileDefinitionsConfig,
    pub retry: Option<RetryConfig>,
    pub termination: Option<TerminationConfig>,
    pub initialization: Option<InitializationConfig>,
    pub reconciler: Option<ReconcilerConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileDefinitionsConfig {
    /// Resolved against the directory holding the configuration file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<PathBuf>>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub owner: Option<String>,
    pub hard_delete_fallback: Option<bool>,
    pub reconciler_parallelism: Option<usize>,
    pub wait_tick_ms: Option<u64>,
    pub soft_delete_timeout_ms: Option<u64>,
    pub workload_delete_timeout_ms: Option<u64>,
    pub resync_interval_ms: Option<u64>,
    pub definition_paths: Option<Vec<PathBuf>>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the overrides from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            config_path: lookup("TENANCY_CONFIG")
                .filter(|raw| !raw.trim().is_empty())
                .map(PathBuf::from),
            owner: lookup("TENANCY_OWNER").filter(|raw| !raw.trim().is_empty()),
            hard_delete_fallback: lookup("TENANCY_HARD_DELETE_FALLBACK")
                .as_deref()
                .and_then(parse_bool),
            reconciler_parallelism: lookup("TENANCY_RECONCILER_PARALLELISM")
                .and_then(|s| s.trim().parse().ok()),
            wait_tick_ms: lookup("TENANCY_WAIT_TICK_MS").and_then(|s| s.trim().parse().ok()),
            soft_delete_timeout_ms: lookup("TENANCY_SOFT_DELETE_TIMEOUT_MS")
                .and_then(|s| s.trim().parse().ok()),
            workload_delete_timeout_ms: lookup("TENANCY_WORKLOAD_DELETE_TIMEOUT_MS")
                .and_then(|s| s.trim().parse().ok()),
            resync_interval_ms: lookup("TENANCY_RESYNC_INTERVAL_MS")
                .and_then(|s| s.trim().parse().ok()),
            definition_paths: lookup("TENANCY_DEFINITION_PATHS").map(|raw| {
                parse_csv(&raw).into_iter().map(PathBuf::from).collect()
            }),
        }
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
