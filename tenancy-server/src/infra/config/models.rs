use std::path::PathBuf;

use tenancy_core::ControllerConfig;

/// Fully composed process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Owner recorded on every active watcher this process registers.
    pub owner: String,
    pub controller: ControllerConfig,
    pub definitions: DefinitionsConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, Default)]
pub struct DefinitionsConfig {
    /// JSON resource-definition files, one source each, in order.
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

pub const DEFAULT_OWNER: &str = "tenant-controller";
